/*!
 * Persistent entity models for jobs and work units.
 *
 * These structures map directly to the SQLite tables and provide type-safe
 * access to persisted pipeline state. Status enums round-trip through their
 * Display / FromStr forms, which is also how they are stored.
 */

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker to pick the job up
    Queued,
    /// A pipeline run is underway
    Processing,
    /// All stages finished; ready for the external rebuild phase
    Done,
    /// A stage-fatal error occurred; error detail is set
    Failed,
    /// Cancellation was requested and observed at a batch boundary
    Cancelled,
}

impl JobStatus {
    /// Whether no further pipeline work will happen for this job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Caller-selected cost/quality level; drives provider and model selection
/// and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Cost-efficient models
    #[default]
    Standard,
    /// Mid-range models
    Premium,
    /// Top models
    Enterprise,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTier::Standard => write!(f, "standard"),
            QualityTier::Premium => write!(f, "premium"),
            QualityTier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(QualityTier::Standard),
            "premium" => Ok(QualityTier::Premium),
            "enterprise" => Ok(QualityTier::Enterprise),
            _ => Err(anyhow::anyhow!("Invalid quality tier: {}", s)),
        }
    }
}

/// Kind of work unit a stage consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// One document page awaiting recognition
    Ocr,
    /// One text chunk awaiting translation
    Translation,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Ocr => write!(f, "ocr"),
            UnitKind::Translation => write!(f, "translation"),
        }
    }
}

impl std::str::FromStr for UnitKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ocr" => Ok(UnitKind::Ocr),
            "translation" => Ok(UnitKind::Translation),
            _ => Err(anyhow::anyhow!("Invalid unit kind: {}", s)),
        }
    }
}

/// Work unit processing status.
///
/// `Degraded` is the fail-soft terminal state: every candidate failed and
/// the recorded result is the identity pass-through, with the last error
/// kept for inspection. `Completed` always means a real result. `Failed` is
/// reserved for units that could not even record a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Awaiting processing
    Pending,
    /// Currently being processed
    Processing,
    /// Processed with a real result
    Completed,
    /// Fail-softed: identity result, error detail recorded
    Degraded,
    /// No result could be recorded
    Failed,
}

impl UnitStatus {
    /// Whether this unit needs no further processing
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Degraded | Self::Failed)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Pending => write!(f, "pending"),
            UnitStatus::Processing => write!(f, "processing"),
            UnitStatus::Completed => write!(f, "completed"),
            UnitStatus::Degraded => write!(f, "degraded"),
            UnitStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UnitStatus::Pending),
            "processing" => Ok(UnitStatus::Processing),
            "completed" => Ok(UnitStatus::Completed),
            "degraded" => Ok(UnitStatus::Degraded),
            "failed" => Ok(UnitStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid unit status: {}", s)),
        }
    }
}

/// One document-processing request
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Job identifier
    pub id: String,
    /// Opaque reference to the uploaded document
    pub document_ref: String,
    /// Source language code, or "auto"
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Quality tier for provider selection
    pub tier: QualityTier,
    /// Whether formatting must be preserved through translation
    pub preserve_formatting: bool,
    /// Optional term mapping applied to every chunk
    pub glossary: Option<BTreeMap<String, String>>,
    /// Current status
    pub status: JobStatus,
    /// Overall progress 0-100; never decreases within a run
    pub progress: u8,
    /// Name of the stage currently (or last) active
    pub stage: Option<String>,
    /// Human-readable summary of the current step, display-ready
    pub message: String,
    /// Error detail, present only when failed
    pub error_detail: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl JobRecord {
    /// Create a new queued job
    pub fn new(
        document_ref: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        tier: QualityTier,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            document_ref: document_ref.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            tier,
            preserve_formatting: false,
            glossary: None,
            status: JobStatus::Queued,
            progress: 0,
            stage: None,
            message: "queued".to_string(),
            error_detail: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Set the formatting-preservation flag
    pub fn with_preserve_formatting(mut self, preserve: bool) -> Self {
        self.preserve_formatting = preserve;
        self
    }

    /// Attach a glossary
    pub fn with_glossary(mut self, glossary: BTreeMap<String, String>) -> Self {
        self.glossary = Some(glossary);
        self
    }

    /// Glossary as ordered pairs for prompt construction
    pub fn glossary_pairs(&self) -> Vec<(String, String)> {
        self.glossary
            .as_ref()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The atomic item a stage processes
#[derive(Debug, Clone)]
pub struct WorkUnitRecord {
    /// Unit identifier
    pub id: String,
    /// Parent job identifier
    pub job_id: String,
    /// Which stage consumes this unit
    pub kind: UnitKind,
    /// Position used for deterministic reassembly; unique per (job, kind)
    pub ordinal: i64,
    /// Input payload, JSON-encoded
    pub payload: String,
    /// Processing status
    pub status: UnitStatus,
    /// Result payload once terminal, JSON-encoded
    pub result: Option<String>,
    /// Error detail for degraded/failed units
    pub error_detail: Option<String>,
    /// Number of processing passes this unit has been through
    pub attempts: i64,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl WorkUnitRecord {
    /// Create a new pending unit with a serialized payload
    pub fn new<P: Serialize>(
        job_id: impl Into<String>,
        kind: UnitKind,
        ordinal: i64,
        payload: &P,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            kind,
            ordinal,
            payload: serde_json::to_string(payload)?,
            status: UnitStatus::Pending,
            result: None,
            error_detail: None,
            attempts: 0,
            updated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Deserialize the input payload
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Deserialize the result payload, if any
    pub fn result_as<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.result {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    /// Transition to completed with a real result
    pub fn completed(mut self, result: serde_json::Value) -> Self {
        self.status = UnitStatus::Completed;
        self.result = Some(result.to_string());
        self.error_detail = None;
        self.attempts += 1;
        self.updated_at = Utc::now().to_rfc3339();
        self
    }

    /// Transition to degraded with a fail-soft fallback result
    pub fn degraded(mut self, result: serde_json::Value, error: String) -> Self {
        self.status = UnitStatus::Degraded;
        self.result = Some(result.to_string());
        self.error_detail = Some(error);
        self.attempts += 1;
        self.updated_at = Utc::now().to_rfc3339();
        self
    }
}

/// Cached translation row
#[derive(Debug, Clone)]
pub struct CacheRecord {
    /// sha256 over (text, language pair, model)
    pub cache_key: String,
    /// Translated text
    pub translated_text: String,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Model that produced the cached result
    pub model: String,
    /// Confidence recorded with the original result
    pub confidence: f32,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}
