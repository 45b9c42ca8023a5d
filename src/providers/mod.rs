/*!
 * Provider adapters for translation engines.
 *
 * This module contains client implementations for the supported translation
 * providers:
 * - OpenAI: chat-completions API
 * - Anthropic: messages API
 * - Mock: deterministic in-process adapter, guaranteed last-resort fallback
 *
 * All adapters are stateless across calls and safe to share between jobs.
 */

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Debug;

use crate::errors::ProviderError;

pub mod anthropic;
pub mod mock;
pub mod openai;

/// One translation request as seen by an adapter.
///
/// The stage resolves job-level settings (glossary, formatting flag,
/// detected language) into this flat shape so adapters stay free of
/// pipeline concerns.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    /// Source text of one chunk
    pub text: String,
    /// Source language code, or "auto" when detection failed upstream
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Term mappings that must be honored verbatim
    pub glossary: Vec<(String, String)>,
    /// Whether line breaks and inline markers must be preserved
    pub preserve_formatting: bool,
}

/// The uniform result every adapter produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranslationOutcome {
    /// Translated text
    pub translated_text: String,
    /// Adapter that produced the result
    pub provider: String,
    /// Model identifier actually used
    pub model: String,
    /// Total tokens consumed by the call
    pub token_count: u32,
    /// Provider confidence in [0, 1]
    pub confidence: f32,
    /// Wall-clock duration of the provider call
    pub processing_time_ms: u64,
    /// Provider-specific extras (e.g. whether the reply honored the
    /// structured response schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Common trait for all translation providers.
///
/// `is_available` must be answerable from configuration alone: a missing
/// API key makes an adapter unavailable without any network traffic.
#[async_trait]
pub trait TranslationAdapter: Send + Sync + Debug {
    /// Stable provider name used by the router's preference table
    fn name(&self) -> &'static str;

    /// Whether this adapter is usable with the current configuration
    fn is_available(&self) -> bool;

    /// Translate one chunk with the given model
    async fn translate(
        &self,
        request: &TranslationRequest,
        model: &str,
    ) -> Result<TranslationOutcome, ProviderError>;
}

/// Structured payload adapters ask the model to emit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredTranslation {
    /// The translated text
    pub translation: String,
    /// Model self-reported confidence, when present
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Decoded model reply: either the structured schema we asked for, or the
/// raw text kept as an explicit best-effort fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutput {
    /// The model honored the response schema
    Structured(StructuredTranslation),
    /// The model replied free-form; the text is used as-is
    RawText(String),
}

impl ProviderOutput {
    /// Decode a model reply. JSON matching the schema wins; anything else is
    /// the tagged raw-text fallback, trimmed.
    pub fn decode(body: &str) -> Self {
        let trimmed = body.trim();

        // Models occasionally wrap the JSON in a code fence; strip one layer.
        let unfenced = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|rest| rest.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed);

        match serde_json::from_str::<StructuredTranslation>(unfenced) {
            Ok(parsed) => Self::Structured(parsed),
            Err(_) => Self::RawText(trimmed.to_string()),
        }
    }

    /// Final translated text plus self-reported confidence, if any.
    pub fn into_text(self) -> (String, Option<f32>) {
        match self {
            Self::Structured(s) => (s.translation, s.confidence.map(|c| c.clamp(0.0, 1.0))),
            Self::RawText(text) => (text, None),
        }
    }
}

/// Build the (system, user) prompt pair shared by the HTTP adapters.
pub(crate) fn build_prompt(request: &TranslationRequest) -> (String, String) {
    let source = if request.source_language == crate::language::AUTO {
        "the source language".to_string()
    } else {
        crate::language::language_name(&request.source_language)
    };
    let target = crate::language::language_name(&request.target_language);

    let mut system = format!(
        "You are a professional document translator. Translate from {} to {}. \
         Reply with a JSON object: {{\"translation\": \"...\"}} and nothing else.",
        source, target
    );
    if request.preserve_formatting {
        system.push_str(
            " Preserve all line breaks, whitespace and inline markup markers exactly.",
        );
    }
    if !request.glossary.is_empty() {
        system.push_str("\nAlways use these term translations:");
        for (term, replacement) in &request.glossary {
            system.push_str(&format!("\n- {} -> {}", term, replacement));
        }
    }

    (system, request.text.clone())
}
