/*!
 * The pipeline worker engine.
 *
 * Submodules:
 * - `progress`: monotonic job progress tracking
 * - `stage`: the stage abstraction and shared batch-processing runner
 * - `ocr_stage` / `translation_stage`: the two concrete stages
 * - `orchestrator`: stage sequencing and terminal status decisions
 */

use serde::{Deserialize, Serialize};

pub mod ocr_stage;
pub mod orchestrator;
pub mod progress;
pub mod stage;
pub mod translation_stage;

pub use ocr_stage::OcrStage;
pub use orchestrator::{PipelineOrchestrator, PipelineRun};
pub use progress::{ProgressBand, ProgressTracker, ProgressUpdate};
pub use stage::{Stage, StageContext, StageReport, run_stage};
pub use translation_stage::TranslationStage;

/// Input payload of one translation work unit, created by the OCR stage.
///
/// The (page_number, chunk_index) pair mirrors the unit's ordinal and is
/// kept in the payload so the rebuild phase can place translated text
/// without decoding ordinals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Source text of this chunk
    pub text: String,
    /// Language detected for the originating page, when known
    pub detected_language: Option<String>,
    /// 1-based page number the chunk came from
    pub page_number: u32,
    /// 0-based index of the chunk within its page
    pub chunk_index: u32,
}
