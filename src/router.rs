/*!
 * Provider routing by quality tier.
 *
 * The router turns a job's quality tier into an ordered candidate list of
 * (adapter, model) pairs: most-preferred first, filtered to adapters that
 * are actually available, and always terminated by the mock adapter so the
 * list is never empty and a unit can never stall on missing credentials.
 *
 * The tier table below is the only tier-specific logic in the crate.
 */

use std::sync::Arc;

use log::debug;

use crate::app_config::ProvidersConfig;
use crate::errors::PipelineError;
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::mock::{MOCK_MODEL, MockAdapter};
use crate::providers::openai::OpenAiAdapter;
use crate::providers::TranslationAdapter;
use crate::store::models::QualityTier;

/// One routable (provider, model) pair
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The adapter to call
    pub adapter: Arc<dyn TranslationAdapter>,
    /// The model to request from it
    pub model: String,
}

impl Candidate {
    /// Short display form for logs
    pub fn describe(&self) -> String {
        format!("{}/{}", self.adapter.name(), self.model)
    }
}

/// Fixed preference table: tier -> ranked (provider, model) pairs.
fn tier_preferences(tier: QualityTier) -> &'static [(&'static str, &'static str)] {
    match tier {
        QualityTier::Enterprise => &[
            ("anthropic", "claude-3-opus-20240229"),
            ("openai", "gpt-4-turbo"),
        ],
        QualityTier::Premium => &[
            ("anthropic", "claude-3-5-sonnet-20240620"),
            ("openai", "gpt-4o"),
        ],
        QualityTier::Standard => &[
            ("openai", "gpt-4o-mini"),
            ("anthropic", "claude-3-haiku-20240307"),
        ],
    }
}

/// Selects the adapter to try next for a requested quality tier
pub struct ProviderRouter {
    /// Registered real adapters, looked up by name from the tier table
    adapters: Vec<Arc<dyn TranslationAdapter>>,
    /// Guaranteed final candidate
    mock: Arc<MockAdapter>,
}

impl ProviderRouter {
    /// Build the router from provider configuration.
    ///
    /// Adapters are constructed unconditionally; availability is evaluated
    /// per call so credential changes between jobs are picked up from the
    /// injected configuration, not from network probes.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let adapters: Vec<Arc<dyn TranslationAdapter>> = vec![
            Arc::new(OpenAiAdapter::new(&config.openai)),
            Arc::new(AnthropicAdapter::new(&config.anthropic)),
        ];
        Self::with_adapters(adapters)
    }

    /// Build the router from pre-constructed adapters (used by tests)
    pub fn with_adapters(adapters: Vec<Arc<dyn TranslationAdapter>>) -> Self {
        Self {
            adapters,
            mock: Arc::new(MockAdapter::new()),
        }
    }

    /// The shared mock adapter (exposed so callers can inspect call counts)
    pub fn mock(&self) -> &Arc<MockAdapter> {
        &self.mock
    }

    /// Ordered candidate list for a tier: preference order, available
    /// adapters only, mock always last.
    pub fn candidates(&self, tier: QualityTier) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = tier_preferences(tier)
            .iter()
            .filter_map(|(name, model)| {
                self.adapters
                    .iter()
                    .find(|adapter| adapter.name() == *name && adapter.is_available())
                    .map(|adapter| Candidate {
                        adapter: Arc::clone(adapter),
                        model: model.to_string(),
                    })
            })
            .collect();

        candidates.push(Candidate {
            adapter: self.mock.clone() as Arc<dyn TranslationAdapter>,
            model: MOCK_MODEL.to_string(),
        });

        debug!(
            "router: {} candidate(s) for tier {}: {}",
            candidates.len(),
            tier,
            candidates
                .iter()
                .map(Candidate::describe)
                .collect::<Vec<_>>()
                .join(", ")
        );

        candidates
    }

    /// Guard for the by-design-unreachable empty-router case.
    pub fn ensure_usable(&self) -> Result<(), PipelineError> {
        if self.mock.is_available() {
            Ok(())
        } else {
            Err(PipelineError::Configuration)
        }
    }
}
