use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;

use super::{ProviderOutput, TranslationAdapter, TranslationOutcome, TranslationRequest, build_prompt};

/// Public API endpoint used when no endpoint override is configured
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

/// API version header value
const API_VERSION: &str = "2023-06-01";

/// Confidence recorded for a structured reply that carries no self-report
const DEFAULT_CONFIDENCE: f32 = 0.92;

/// Confidence recorded when the reply fell back to raw text
const RAW_TEXT_CONFIDENCE: f32 = 0.75;

/// Adapter for the Anthropic messages API
#[derive(Debug)]
pub struct AnthropicAdapter {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication; empty means unavailable
    api_key: String,
    /// API endpoint URL
    endpoint: String,
    /// Request timeout, also reported in timeout errors
    timeout: Duration,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

/// Anthropic message format
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: TokenUsage,
}

/// Individual content block in a response
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
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

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
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
impl TranslationAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let body = MessagesRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user,
            }],
            system: Some(system),
            max_tokens: 4096,
            temperature: 0.2,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.messages_url())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let reply: String = parsed
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect();
        if reply.is_empty() {
            return Err(ProviderError::Parse(
                "response contained no text content".to_string(),
            ));
        }

        let output = ProviderOutput::decode(&reply);
        let structured = matches!(output, ProviderOutput::Structured(_));
        let (translated_text, confidence) = output.into_text();

        Ok(TranslationOutcome {
            translated_text,
            provider: self.name().to_string(),
            model: model.to_string(),
            token_count: parsed.usage.input_tokens + parsed.usage.output_tokens,
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
