/*!
 * Scripted adapters and engines for exercising failure paths without any
 * external traffic. Each one counts its calls so tests can assert exactly
 * how often providers were hit.
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use doctran::errors::ProviderError;
use doctran::ocr::{LayoutBlock, OcrEngine, OcrOutput, PagePayload};
use doctran::providers::{TranslationAdapter, TranslationOutcome, TranslationRequest};

/// What a scripted adapter does with each request
#[derive(Debug, Clone, Copy)]
pub enum ScriptedBehavior {
    /// Succeed with a marked translation
    Working,
    /// Always fail with a retryable error
    AlwaysTransient,
    /// Always fail with a non-retryable error
    AlwaysPermanent,
    /// Fail permanently only when the text contains the marker
    FailWhenContains(&'static str),
}

/// Translation adapter with predetermined behavior.
///
/// The name is configurable so tests can impersonate the providers the
/// router's tier table knows about.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: &'static str,
    behavior: ScriptedBehavior,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    /// Create a scripted adapter impersonating `name`
    pub fn named(name: &'static str, behavior: ScriptedBehavior) -> Self {
        Self {
            name,
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter handle
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl TranslationAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
        model: &str,
    ) -> Result<TranslationOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail_permanently = match self.behavior {
            ScriptedBehavior::Working => false,
            ScriptedBehavior::AlwaysTransient => {
                return Err(ProviderError::Api {
                    status_code: 503,
                    message: "scripted transient failure".to_string(),
                });
            }
            ScriptedBehavior::AlwaysPermanent => true,
            ScriptedBehavior::FailWhenContains(marker) => request.text.contains(marker),
        };

        if fail_permanently {
            return Err(ProviderError::InvalidRequest(
                "scripted permanent failure".to_string(),
            ));
        }

        Ok(TranslationOutcome {
            translated_text: format!("<{}> {}", self.name, request.text),
            provider: self.name.to_string(),
            model: model.to_string(),
            token_count: request.text.len() as u32,
            confidence: 0.9,
            processing_time_ms: 1,
            metadata: None,
        })
    }
}

/// OCR engine that counts calls and tracks concurrent activity across every
/// instance sharing the same handles
#[derive(Debug)]
pub struct CountingOcrEngine {
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    delay_ms: u64,
}

impl CountingOcrEngine {
    /// Create `count` engine instances sharing one set of counters; returns
    /// the instances plus (calls, max_active) handles
    pub fn fleet(
        count: usize,
        delay_ms: u64,
    ) -> (Vec<Arc<dyn OcrEngine>>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let engines = (0..count)
            .map(|_| {
                Arc::new(CountingOcrEngine {
                    calls: Arc::clone(&calls),
                    active: Arc::clone(&active),
                    max_active: Arc::clone(&max_active),
                    delay_ms,
                }) as Arc<dyn OcrEngine>
            })
            .collect();

        (engines, calls, max_active)
    }
}

#[async_trait]
impl OcrEngine for CountingOcrEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn recognize(&self, page: &PagePayload) -> Result<OcrOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);

        let text = format!("Recognized text for the page {} content.", page.page_number);
        Ok(OcrOutput {
            text: text.clone(),
            blocks: vec![LayoutBlock {
                text,
                bbox: (0.1, 0.1, 0.8, 0.8),
            }],
            confidence: 0.9,
            detected_language: Some("en".to_string()),
        })
    }
}
