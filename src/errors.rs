/*!
 * Error types for the doctran pipeline engine.
 *
 * This module contains custom error types for the different layers of the
 * pipeline, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors returned by a single provider or OCR engine call.
///
/// Every variant is classified as either transient (worth retrying, possibly
/// on a fallback candidate) or permanent (retrying the same call cannot
/// succeed) via [`ProviderError::is_transient`].
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The call did not complete within the configured deadline
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The provider asked us to slow down
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Error establishing or maintaining a connection
    #[error("connection error: {0}")]
    Connection(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The response body could not be decoded
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// The request was rejected as malformed before being attempted
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider cannot translate between these languages
    #[error("unsupported language pair: {source_lang} -> {target}")]
    UnsupportedLanguagePair {
        /// Source language code
        source_lang: String,
        /// Target language code
        target: String,
    },

    /// Error with authentication
    #[error("authentication error: {0}")]
    Authentication(String),
}

impl ProviderError {
    /// Whether a retry (with backoff, possibly on a fallback candidate)
    /// could plausibly succeed.
    ///
    /// Timeouts, rate limits, connection faults and 429/5xx responses are
    /// transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited(_) | Self::Connection(_) => true,
            Self::Api { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::Parse(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedLanguagePair { .. }
            | Self::Authentication(_) => false,
        }
    }
}

/// Errors that abort a stage (and with it, the job).
///
/// Unit-level provider errors never surface here: they are absorbed by the
/// fail-soft degradation path. A `StageError` always escalates to job
/// failure.
#[derive(Error, Debug)]
pub enum StageError {
    /// The upstream stage produced nothing for this stage to consume
    #[error("stage {stage} has no input units for job {job_id}")]
    NoInput {
        /// Name of the stage that found no input
        stage: &'static str,
        /// Job identifier
        job_id: String,
    },

    /// A store write failed; unit results could not be recorded
    #[error("failed to persist results: {0}")]
    Persistence(String),

    /// The stage was constructed with unusable settings
    #[error("invalid stage configuration: {0}")]
    Configuration(String),
}

/// Errors reported by the pipeline orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed and the job was marked failed
    #[error("stage {stage} failed for job {job_id}: {source}")]
    Stage {
        /// Job identifier
        job_id: String,
        /// Name of the failing stage
        stage: &'static str,
        /// The underlying stage error
        #[source]
        source: StageError,
    },

    /// No usable provider at all, including the mock.
    ///
    /// Unreachable by design (the mock adapter is always available) but
    /// guarded so a future misconfiguration fails loudly instead of
    /// looping.
    #[error("no usable translation provider is configured (mock fallback missing)")]
    Configuration,

    /// The requested job does not exist in the store
    #[error("job {0} not found")]
    JobNotFound(String),

    /// A store read failed before any stage could run
    #[error("store error: {0}")]
    Store(String),
}
