/*!
 * # doctran - document translation pipeline worker
 *
 * The worker engine of a document translation system: uploaded documents are
 * processed through an asynchronous multi-stage pipeline (OCR text/layout
 * extraction, source-language detection, machine translation across multiple
 * AI providers) while a shared store tracks per-job status and monotonic
 * progress for external consumers.
 *
 * ## Features
 *
 * - Stage abstraction with a shared concurrency-bounded batch runner
 * - Per-unit retry with exponential backoff and provider fallback
 * - Provider routing by quality tier (standard / premium / enterprise),
 *   always terminated by an in-process mock so jobs never stall on
 *   missing credentials
 * - Fixed-size OCR engine pool behind a bounded channel
 * - Fail-soft unit degradation: one bad page or chunk never aborts a job
 * - SQLite job/work-unit store; every stage is independently restartable
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: configuration management
 * - `providers`: translation provider adapters (OpenAI, Anthropic, mock)
 * - `router`: quality-tier provider routing
 * - `retry`: bounded retry with candidate fallback
 * - `batch`: ordered concurrency-bounded partitioning
 * - `ocr`: OCR engines and the engine pool
 * - `pipeline`: stages, progress tracking and the orchestrator
 * - `store`: SQLite persistence for jobs and work units
 * - `language`: ISO language codes and heuristic detection
 * - `errors`: custom error types for the engine
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]

// Public modules
pub mod app_config;
pub mod batch;
pub mod errors;
pub mod language;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod router;
pub mod store;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{PipelineError, ProviderError, StageError};
pub use pipeline::{PipelineOrchestrator, PipelineRun, ProgressTracker};
pub use providers::{TranslationAdapter, TranslationOutcome, TranslationRequest};
pub use retry::RetryPolicy;
pub use router::ProviderRouter;
pub use store::{JobRecord, JobStatus, QualityTier, Repository};
