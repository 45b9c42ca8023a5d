/*!
 * OCR engines and the fixed-size engine pool.
 *
 * An engine instance recognizes one page at a time. The pool hands engines
 * out through a bounded channel: `acquire` blocks until an instance is free,
 * and the returned lease gives the engine back when dropped. Pool size is
 * therefore the hard concurrency bound for the OCR stage: no scanning, no
 * sleep-polling.
 */

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::app_config::{OcrConfig, OcrEngineKind};
use crate::errors::ProviderError;
use crate::language;

/// Input payload of one OCR work unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePayload {
    /// Opaque reference to the page image (storage key, path, URL)
    pub image_ref: String,
    /// 1-based page number within the document
    pub page_number: u32,
}

/// One recognized region of a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutBlock {
    /// Block text
    pub text: String,
    /// Bounding box as (x, y, width, height) fractions of the page
    pub bbox: (f32, f32, f32, f32),
}

/// Result payload of one OCR work unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Full page text in reading order
    pub text: String,
    /// Layout blocks for the rebuild phase
    pub blocks: Vec<LayoutBlock>,
    /// Recognition confidence in [0, 1]; 0.0 marks a degraded unit
    pub confidence: f32,
    /// Language detected from the page text, when detection succeeded
    pub detected_language: Option<String>,
}

impl OcrOutput {
    /// Fail-soft output recorded when recognition was given up on
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            blocks: Vec::new(),
            confidence: 0.0,
            detected_language: None,
        }
    }
}

/// One OCR engine instance. Implementations must tolerate concurrent use of
/// *different* instances; a single instance is never used for two pages at
/// once (the pool enforces this).
#[async_trait]
pub trait OcrEngine: Send + Sync + Debug {
    /// Engine implementation name
    fn name(&self) -> &'static str;

    /// Recognize one page
    async fn recognize(&self, page: &PagePayload) -> Result<OcrOutput, ProviderError>;
}

/// Deterministic engine for local verification and tests.
///
/// Selected only through explicit configuration (`ocr.engine = "mock"`);
/// production stage logic never falls through to it.
#[derive(Debug, Default)]
pub struct MockOcrEngine;

impl MockOcrEngine {
    /// Create a new mock engine
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(&self, page: &PagePayload) -> Result<OcrOutput, ProviderError> {
        // Deterministic synthetic text derived from the page reference, so
        // repeated runs and tests see stable output.
        let text = format!(
            "The quick brown fox inspects page {} of the document {}. \
             This is the recognized body text used for the translation stages.",
            page.page_number, page.image_ref
        );

        let blocks = vec![
            LayoutBlock {
                text: format!("Page {}", page.page_number),
                bbox: (0.1, 0.05, 0.8, 0.05),
            },
            LayoutBlock {
                text: text.clone(),
                bbox: (0.1, 0.15, 0.8, 0.7),
            },
        ];

        let detected_language = language::detect(&text).map(str::to_string);

        Ok(OcrOutput {
            text,
            blocks,
            confidence: 0.95,
            detected_language,
        })
    }
}

/// Fixed-size pool of OCR engine instances backed by a bounded channel
pub struct EnginePool {
    /// Idle engines; capacity equals pool size
    idle: Mutex<mpsc::Receiver<Arc<dyn OcrEngine>>>,
    /// Return path used by leases
    returns: mpsc::Sender<Arc<dyn OcrEngine>>,
    /// Number of engine instances
    size: usize,
}

impl EnginePool {
    /// Create a pool over the given engine instances
    pub fn new(engines: Vec<Arc<dyn OcrEngine>>) -> Result<Self> {
        if engines.is_empty() {
            return Err(anyhow!("engine pool requires at least one engine"));
        }

        let size = engines.len();
        let (returns, idle) = mpsc::channel(size);
        for engine in engines {
            // Capacity equals the engine count; these sends cannot fail.
            returns
                .try_send(engine)
                .map_err(|_| anyhow!("failed to seed engine pool"))?;
        }

        Ok(Self {
            idle: Mutex::new(idle),
            returns,
            size,
        })
    }

    /// Build a pool from configuration
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let engines: Vec<Arc<dyn OcrEngine>> = (0..config.pool_size)
            .map(|_| match config.engine {
                OcrEngineKind::Mock => Arc::new(MockOcrEngine::new()) as Arc<dyn OcrEngine>,
            })
            .collect();
        Self::new(engines)
    }

    /// Number of engine instances in the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free engine. The lease returns it on drop.
    pub async fn acquire(&self) -> Result<EngineLease> {
        let mut idle = self.idle.lock().await;
        let engine = idle
            .recv()
            .await
            .ok_or_else(|| anyhow!("engine pool channel closed"))?;
        Ok(EngineLease {
            engine: Some(engine),
            returns: self.returns.clone(),
        })
    }
}

/// Exclusive hold on one engine instance
pub struct EngineLease {
    engine: Option<Arc<dyn OcrEngine>>,
    returns: mpsc::Sender<Arc<dyn OcrEngine>>,
}

impl EngineLease {
    /// The leased engine
    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        // The option is only vacated in drop.
        self.engine
            .as_ref()
            .unwrap_or_else(|| unreachable!("lease accessed after drop"))
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            // Capacity equals pool size, so the return cannot be rejected.
            let _ = self.returns.try_send(engine);
        }
    }
}
