/*!
 * Common test utilities for the doctran test suite
 */

use std::sync::Arc;

use doctran::app_config::Config;
use doctran::ocr::{EnginePool, MockOcrEngine, OcrEngine};
use doctran::pipeline::PipelineOrchestrator;
use doctran::providers::TranslationAdapter;
use doctran::router::ProviderRouter;
use doctran::store::{self, JobRecord, JobSeed, QualityTier, Repository};

// Re-export the scripted adapters module
pub mod adapters;

/// Configuration tuned for fast tests: tiny backoff, short timeouts
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.translation.retry_base_delay_ms = 1;
    config.translation.batch_timeout_secs = 10;
    config.ocr.batch_timeout_secs = 10;
    config
}

/// In-memory repository with one seeded job of `pages` OCR units
pub async fn seeded_repo(pages: u32) -> (Repository, JobRecord) {
    seeded_repo_with_languages(pages, "auto", "fr").await
}

/// In-memory repository with one seeded job and explicit languages
pub async fn seeded_repo_with_languages(
    pages: u32,
    source: &str,
    target: &str,
) -> (Repository, JobRecord) {
    let repo = Repository::new_in_memory().expect("Failed to create in-memory store");
    let job = store::seed_job(
        &repo,
        JobSeed {
            document_ref: "test-document".to_string(),
            pages,
            source_language: source.to_string(),
            target_language: target.to_string(),
            tier: QualityTier::Standard,
            preserve_formatting: false,
            glossary: None,
        },
    )
    .await
    .expect("Failed to seed job");
    (repo, job)
}

/// Engine pool of `size` deterministic mock engines
pub fn mock_pool(size: usize) -> Arc<EnginePool> {
    let engines: Vec<Arc<dyn OcrEngine>> = (0..size)
        .map(|_| Arc::new(MockOcrEngine::new()) as Arc<dyn OcrEngine>)
        .collect();
    Arc::new(EnginePool::new(engines).expect("Failed to build engine pool"))
}

/// Standard two-stage orchestrator over scripted adapters and a mock pool.
/// Returns the router too so tests can inspect the shared mock adapter.
pub fn orchestrator_with(
    config: &Config,
    repo: Repository,
    adapters: Vec<Arc<dyn TranslationAdapter>>,
    pool: Arc<EnginePool>,
) -> (PipelineOrchestrator, Arc<ProviderRouter>) {
    let router = Arc::new(ProviderRouter::with_adapters(adapters));
    let orchestrator =
        PipelineOrchestrator::standard(config, repo, Arc::clone(&router), pool)
            .expect("Failed to build orchestrator");
    (orchestrator, router)
}
