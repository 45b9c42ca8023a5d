/*!
 * Persistent job/work-unit store.
 *
 * The store is the single source of truth for pipeline state. Stages never
 * cache unit state across stage boundaries; they reload from here, which
 * is what makes every stage independently restartable.
 */

use anyhow::Result;

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::DatabaseConnection;
pub use models::{JobRecord, JobStatus, QualityTier, UnitKind, UnitStatus, WorkUnitRecord};
pub use repository::{JobUpdate, Repository};

use crate::language;
use crate::ocr::PagePayload;

/// Parameters for seeding one verification job
#[derive(Debug, Clone)]
pub struct JobSeed {
    /// Opaque document reference
    pub document_ref: String,
    /// Number of pages to create OCR units for
    pub pages: u32,
    /// Source language code or "auto"
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Quality tier
    pub tier: QualityTier,
    /// Formatting-preservation flag
    pub preserve_formatting: bool,
    /// Optional glossary
    pub glossary: Option<std::collections::BTreeMap<String, String>>,
}

/// Create a job plus its initial OCR work units.
///
/// Production jobs arrive through an external enqueuer that performs the
/// same writes; this helper backs the CLI verification mode and the tests.
pub async fn seed_job(repo: &Repository, seed: JobSeed) -> Result<JobRecord> {
    // Normalize up front so every stage sees canonical codes ("fra" -> "fr",
    // "auto" passes through for detection).
    let source_language = language::normalize(&seed.source_language)?;
    let target_language = language::normalize(&seed.target_language)?;

    let mut job = JobRecord::new(
        seed.document_ref.clone(),
        source_language,
        target_language,
        seed.tier,
    )
    .with_preserve_formatting(seed.preserve_formatting);
    if let Some(glossary) = seed.glossary {
        job = job.with_glossary(glossary);
    }

    repo.create_job(&job).await?;

    let mut units = Vec::with_capacity(seed.pages as usize);
    for page_number in 1..=seed.pages {
        let payload = PagePayload {
            image_ref: format!("{}/page-{:04}.png", seed.document_ref, page_number),
            page_number,
        };
        units.push(WorkUnitRecord::new(
            job.id.clone(),
            UnitKind::Ocr,
            page_number as i64,
            &payload,
        )?);
    }
    repo.insert_units(units).await?;

    Ok(job)
}
