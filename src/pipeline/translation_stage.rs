/*!
 * Translation stage: text chunks -> translated chunks.
 *
 * Each unit runs the retry policy over the router's candidate list for the
 * job's quality tier. Empty chunks are identity no-ops, cached translations
 * are reused before any provider is called, and a unit whose every candidate
 * failed is degraded to its original text rather than failing the job.
 */

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ProviderError, StageError};
use crate::language;
use crate::providers::{TranslationOutcome, TranslationRequest};
use crate::retry::RetryPolicy;
use crate::router::ProviderRouter;
use crate::store::models::{CacheRecord, JobRecord, UnitKind, WorkUnitRecord};
use crate::store::repository::Repository;

use super::ChunkPayload;
use super::progress::ProgressBand;
use super::stage::{Stage, StageContext, StageReport};

/// Stage name as recorded on job rows
pub const STAGE_NAME: &str = "translation";

/// Provider name recorded for results that made no provider call
const IDENTITY_PROVIDER: &str = "identity";

/// Provider name recorded for cache hits
const CACHE_PROVIDER: &str = "cache";

/// Translates text chunks through the provider router
pub struct TranslationStage {
    /// Provider routing by quality tier
    router: Arc<ProviderRouter>,
    /// Per-unit retry policy
    retry: RetryPolicy,
    /// Maximum concurrent provider requests
    concurrency: usize,
    /// Progress interval owned by this stage
    band: ProgressBand,
    /// Wall-clock bound per batch
    batch_timeout: Duration,
    /// Whether to consult the translation cache
    cache_enabled: bool,
    /// Store handle for cache reads/writes
    repo: Repository,
}

impl TranslationStage {
    /// Create the stage
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<ProviderRouter>,
        retry: RetryPolicy,
        concurrency: usize,
        band: ProgressBand,
        batch_timeout: Duration,
        cache_enabled: bool,
        repo: Repository,
    ) -> Self {
        Self {
            router,
            retry,
            concurrency,
            band,
            batch_timeout,
            cache_enabled,
            repo,
        }
    }

    /// Resolve the language the provider should translate from: the chunk's
    /// detected language wins over the job-level setting, "auto" survives
    /// only when detection found nothing.
    fn source_language(job: &JobRecord, chunk: &ChunkPayload) -> String {
        chunk
            .detected_language
            .clone()
            .unwrap_or_else(|| job.source_language.clone())
    }

    /// Identity result for the empty-input fast path. Confidence 1.0 by
    /// decision: identity is exact, and 0.0 stays reserved for degraded
    /// units.
    fn identity_outcome(text: &str) -> TranslationOutcome {
        TranslationOutcome {
            translated_text: text.to_string(),
            provider: IDENTITY_PROVIDER.to_string(),
            model: IDENTITY_PROVIDER.to_string(),
            token_count: 0,
            confidence: 1.0,
            processing_time_ms: 0,
            metadata: None,
        }
    }
}

#[async_trait]
impl Stage for TranslationStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn band(&self) -> ProgressBand {
        self.band
    }

    fn input_kind(&self) -> UnitKind {
        UnitKind::Translation
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    async fn process_unit(
        &self,
        job: &JobRecord,
        unit: &WorkUnitRecord,
    ) -> Result<serde_json::Value, ProviderError> {
        let chunk: ChunkPayload = unit
            .payload_as()
            .map_err(|e| ProviderError::InvalidRequest(format!("bad chunk payload: {}", e)))?;

        // Empty input is a no-op success, not an error and not a provider
        // call.
        if chunk.text.trim().is_empty() {
            return encode(Self::identity_outcome(&chunk.text));
        }

        let source_language = Self::source_language(job, &chunk);
        let request = TranslationRequest {
            text: chunk.text.clone(),
            source_language: source_language.clone(),
            target_language: job.target_language.clone(),
            glossary: job.glossary_pairs(),
            preserve_formatting: job.preserve_formatting,
        };

        let candidates = self.router.candidates(job.tier);

        // Cache consultation happens per model actually in play: a hit for
        // the preferred candidate's model short-circuits the whole call.
        let cache_key = candidates.first().map(|primary| {
            Repository::cache_key(
                &chunk.text,
                &source_language,
                &job.target_language,
                &primary.model,
            )
        });
        if self.cache_enabled {
            if let Some(key) = &cache_key {
                if let Ok(Some(hit)) = self.repo.cache_lookup(key).await {
                    return encode(TranslationOutcome {
                        translated_text: hit.translated_text,
                        provider: CACHE_PROVIDER.to_string(),
                        model: hit.model,
                        token_count: 0,
                        confidence: hit.confidence,
                        processing_time_ms: 0,
                        metadata: None,
                    });
                }
            }
        }

        let outcome = self
            .retry
            .execute(&candidates, |candidate, attempt| {
                let request = request.clone();
                async move {
                    debug!(
                        "translating ordinal {} via {} (attempt {})",
                        unit.ordinal,
                        candidate.describe(),
                        attempt
                    );
                    candidate.adapter.translate(&request, &candidate.model).await
                }
            })
            .await?;

        if self.cache_enabled {
            if let Some(key) = cache_key {
                let record = CacheRecord {
                    cache_key: key,
                    translated_text: outcome.translated_text.clone(),
                    source_language,
                    target_language: job.target_language.clone(),
                    model: outcome.model.clone(),
                    confidence: outcome.confidence,
                    created_at: Utc::now().to_rfc3339(),
                };
                // Cache writes are an optimization; failures only get logged.
                if let Err(err) = self.repo.cache_store(record).await {
                    debug!("translation cache write failed: {}", err);
                }
            }
        }

        encode(outcome)
    }

    fn fallback_output(&self, unit: &WorkUnitRecord) -> serde_json::Value {
        // Fail-soft: pass the original text through so the document can
        // still be rebuilt, with the zero-confidence degraded marker.
        let original = unit
            .payload_as::<ChunkPayload>()
            .map(|chunk| chunk.text)
            .unwrap_or_default();

        serde_json::to_value(TranslationOutcome {
            translated_text: original,
            provider: "none".to_string(),
            model: "none".to_string(),
            token_count: 0,
            confidence: 0.0,
            processing_time_ms: 0,
            metadata: None,
        })
        .unwrap_or(serde_json::Value::Null)
    }

    async fn finalize(
        &self,
        job: &JobRecord,
        report: &StageReport,
        ctx: &StageContext,
    ) -> Result<String, StageError> {
        // Token accounting over everything terminal, including units from
        // earlier invocations of this stage.
        let units = ctx
            .repo
            .load_units(&job.id, UnitKind::Translation)
            .await
            .map_err(|e| StageError::Persistence(e.to_string()))?;

        let mut total_tokens: u64 = 0;
        let mut cache_hits = 0usize;
        for unit in &units {
            if let Ok(Some(outcome)) = unit.result_as::<TranslationOutcome>() {
                total_tokens += outcome.token_count as u64;
                if outcome.provider == CACHE_PROVIDER {
                    cache_hits += 1;
                }
            }
        }

        Ok(format!(
            "translated {} chunk(s) to {} ({} degraded, {} cached, {} tokens)",
            report.total_units,
            language::language_name(&job.target_language),
            report.degraded,
            cache_hits,
            total_tokens
        ))
    }
}

fn encode(outcome: TranslationOutcome) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(&outcome)
        .map_err(|e| ProviderError::Parse(format!("failed to encode translation result: {}", e)))
}
