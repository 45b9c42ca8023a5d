/*!
 * Deterministic in-process translation adapter.
 *
 * The mock adapter is the pipeline's guaranteed last-resort candidate: it is
 * always available, never fails, and produces a marked pseudo-translation so
 * a job can complete end-to-end with no external provider configured. It is
 * only ever a primary provider when the router is built for tests; real
 * routing appends it behind the configured vendors.
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::errors::ProviderError;

use super::{TranslationAdapter, TranslationOutcome, TranslationRequest};

/// Model identifier reported for mock results
pub const MOCK_MODEL: &str = "mock-passthrough-v1";

/// Confidence reported for mock results; high enough to read as a real
/// translation, below the structured-reply defaults of the HTTP adapters
pub const MOCK_CONFIDENCE: f32 = 0.85;

/// Always-available adapter producing deterministic pseudo-translations
#[derive(Debug, Default)]
pub struct MockAdapter {
    /// Number of translate calls served; shared across clones
    calls: Arc<AtomicUsize>,
}

impl MockAdapter {
    /// Create a new mock adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of translate calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

#[async_trait]
impl TranslationAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
        model: &str,
    ) -> Result<TranslationOutcome, ProviderError> {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);

        let translated_text = format!("[{}] {}", request.target_language, request.text);

        // Character-derived token estimate; keeps usage accounting non-zero
        // without pretending to be a real tokenizer.
        let token_count = (request.text.chars().count() / 4).max(1) as u32;

        Ok(TranslationOutcome {
            translated_text,
            provider: self.name().to_string(),
            model: model.to_string(),
            token_count,
            confidence: MOCK_CONFIDENCE,
            processing_time_ms: started.elapsed().as_millis() as u64,
            metadata: None,
        })
    }
}
