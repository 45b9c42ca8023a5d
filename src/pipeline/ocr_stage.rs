/*!
 * OCR stage: document pages -> recognized text and layout.
 *
 * Concurrency is bounded by the engine pool: a unit waits for a free engine
 * instance, and an instance serves one page at a time. On completion the
 * stage creates the translation stage's work units by chunking each page's
 * text, so downstream input exists exactly once per job.
 */

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ProviderError, StageError};
use crate::language;
use crate::ocr::{EnginePool, OcrOutput, PagePayload};
use crate::retry::RetryPolicy;
use crate::store::models::{JobRecord, UnitKind, WorkUnitRecord};

use super::ChunkPayload;
use super::progress::ProgressBand;
use super::stage::{Stage, StageContext, StageReport};

/// Stage name as recorded on job rows
pub const STAGE_NAME: &str = "ocr";

/// Ordinal stride between pages; chunk ordinals are `page * STRIDE + index`,
/// which keeps document order total across pages without coordination
pub const PAGE_ORDINAL_STRIDE: i64 = 1000;

/// Recognizes document pages through the shared engine pool
pub struct OcrStage {
    /// Shared pool of engine instances
    pool: Arc<EnginePool>,
    /// Per-unit retry policy
    retry: RetryPolicy,
    /// Progress interval owned by this stage
    band: ProgressBand,
    /// Wall-clock bound per batch
    batch_timeout: Duration,
    /// Maximum source characters per translation chunk created on completion
    max_chars_per_chunk: usize,
}

impl OcrStage {
    /// Create the stage
    pub fn new(
        pool: Arc<EnginePool>,
        retry: RetryPolicy,
        band: ProgressBand,
        batch_timeout: Duration,
        max_chars_per_chunk: usize,
    ) -> Self {
        Self {
            pool,
            retry,
            band,
            batch_timeout,
            max_chars_per_chunk,
        }
    }
}

#[async_trait]
impl Stage for OcrStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn band(&self) -> ProgressBand {
        self.band
    }

    fn input_kind(&self) -> UnitKind {
        UnitKind::Ocr
    }

    fn concurrency(&self) -> usize {
        self.pool.size()
    }

    fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    async fn process_unit(
        &self,
        job: &JobRecord,
        unit: &WorkUnitRecord,
    ) -> Result<serde_json::Value, ProviderError> {
        let page: PagePayload = unit
            .payload_as()
            .map_err(|e| ProviderError::InvalidRequest(format!("bad page payload: {}", e)))?;

        // The pool is the single logical candidate; retries re-acquire an
        // engine so a sick instance is not pinned to the unit.
        let mut output = self
            .retry
            .execute(&[()], |_, attempt| {
                let pool = self.pool.clone();
                let page = page.clone();
                async move {
                    debug!(
                        "recognizing page {} (attempt {})",
                        page.page_number, attempt
                    );
                    let lease = pool
                        .acquire()
                        .await
                        .map_err(|e| ProviderError::Connection(e.to_string()))?;
                    lease.engine().recognize(&page).await
                }
            })
            .await?;

        // Fill in the detected language when the job asks for detection and
        // the engine did not already report one.
        if job.source_language == language::AUTO && output.detected_language.is_none() {
            output.detected_language = language::detect(&output.text).map(str::to_string);
        }

        serde_json::to_value(&output)
            .map_err(|e| ProviderError::Parse(format!("failed to encode OCR result: {}", e)))
    }

    fn fallback_output(&self, _unit: &WorkUnitRecord) -> serde_json::Value {
        // A page has no textual identity to pass through; the empty output
        // with zero confidence is the degraded marker.
        serde_json::to_value(OcrOutput::empty()).unwrap_or(serde_json::Value::Null)
    }

    async fn finalize(
        &self,
        job: &JobRecord,
        report: &StageReport,
        ctx: &StageContext,
    ) -> Result<String, StageError> {
        // Create the translation stage's input exactly once. INSERT OR
        // IGNORE on (job, kind, ordinal) makes re-entry a no-op.
        let pages = ctx
            .repo
            .load_units(&job.id, UnitKind::Ocr)
            .await
            .map_err(|e| StageError::Persistence(e.to_string()))?;

        let mut chunks = Vec::new();
        for page in &pages {
            let output: OcrOutput = match page.result_as() {
                Ok(Some(output)) => output,
                _ => OcrOutput::empty(),
            };
            let page_number = page.ordinal;

            for (chunk_index, text) in
                chunk_text(&output.text, self.max_chars_per_chunk).into_iter().enumerate()
            {
                let payload = ChunkPayload {
                    text,
                    detected_language: output.detected_language.clone(),
                    page_number: page_number as u32,
                    chunk_index: chunk_index as u32,
                };
                chunks.push(
                    WorkUnitRecord::new(
                        job.id.clone(),
                        UnitKind::Translation,
                        page_number * PAGE_ORDINAL_STRIDE + chunk_index as i64,
                        &payload,
                    )
                    .map_err(|e| StageError::Persistence(e.to_string()))?,
                );
            }
        }

        let chunk_count = chunks.len();
        let inserted = ctx
            .repo
            .insert_units(chunks)
            .await
            .map_err(|e| StageError::Persistence(e.to_string()))?;
        debug!(
            "[{}] job {}: {} chunk(s), {} newly inserted",
            STAGE_NAME, job.id, chunk_count, inserted
        );

        Ok(format!(
            "recognized {} page(s) ({} degraded), queued {} translation chunk(s)",
            report.total_units, report.degraded, chunk_count
        ))
    }
}

/// Split page text into translation chunks of at most `max_chars`
/// characters, preferring paragraph breaks, then sentence ends, then hard
/// splits. Empty text still yields one empty chunk so the page remains
/// represented downstream (an empty chunk is a no-op for translation).
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return vec![String::new()];
    }
    if max_chars == 0 || trimmed.chars().count() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in trimmed.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if current.chars().count() + paragraph.chars().count() + 2 > max_chars
            && !current.is_empty()
        {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.chars().count() <= max_chars {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        // Paragraph alone exceeds the limit: fall back to sentence splits,
        // then to hard character splits for pathological sentences.
        for sentence in split_sentences(paragraph) {
            if current.chars().count() + sentence.chars().count() + 1 > max_chars
                && !current.is_empty()
            {
                chunks.push(std::mem::take(&mut current));
            }
            if sentence.chars().count() > max_chars {
                for piece in hard_split(&sentence, max_chars) {
                    if !current.is_empty() {
                        chunks.push(std::mem::take(&mut current));
                    }
                    current = piece;
                }
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&sentence);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if word.ends_with(['.', '!', '?']) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
