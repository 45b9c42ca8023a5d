use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;

use super::{ProviderOutput, TranslationAdapter, TranslationOutcome, TranslationRequest, build_prompt};

/// Public API endpoint used when no endpoint override is configured
const DEFAULT_ENDPOINT: &str = "https://api.openai.com";

/// Confidence recorded for a structured reply that carries no self-report
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Confidence recorded when the reply fell back to raw text
const RAW_TEXT_CONFIDENCE: f32 = 0.7;

/// Adapter for the OpenAI chat-completions API
#[derive(Debug)]
pub struct OpenAiAdapter {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication; empty means unavailable
    api_key: String,
    /// API endpoint URL
    endpoint: String,
    /// Request timeout, also reported in timeout errors
    timeout: Duration,
}

/// Chat-completions request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Chat message format
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat-completions response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// One returned choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Token usage information
#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiAdapter {
    /// Create a new adapter from provider configuration
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            endpoint: if config.endpoint.is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                config.endpoint.clone()
            },
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        )
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl TranslationAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
        model: &str,
    ) -> Result<TranslationOutcome, ProviderError> {
        let (system, user) = build_prompt(request);
        let body = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.2,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response body".to_string());
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Authentication(message),
                429 => ProviderError::RateLimited(message),
                code => ProviderError::Api {
                    status_code: code,
                    message,
                },
            });
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let reply = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::Parse("response contained no choices".to_string()))?;

        let output = ProviderOutput::decode(&reply);
        let structured = matches!(output, ProviderOutput::Structured(_));
        let (translated_text, confidence) = output.into_text();

        Ok(TranslationOutcome {
            translated_text,
            provider: self.name().to_string(),
            model: model.to_string(),
            token_count: parsed.usage.unwrap_or_default().total_tokens,
            confidence: confidence.unwrap_or(if structured {
                DEFAULT_CONFIDENCE
            } else {
                RAW_TEXT_CONFIDENCE
            }),
            processing_time_ms: elapsed_ms,
            metadata: Some(serde_json::json!({ "structured": structured })),
        })
    }
}
