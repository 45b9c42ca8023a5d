use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration module
/// This module handles loading, validating and defaulting the pipeline
/// configuration. Provider credentials are injected from the environment and
/// never required: a provider without credentials is simply absent from the
/// router's candidate list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Path to the SQLite job store; `None` uses the per-user data directory
    #[serde(default)]
    pub database_path: Option<String>,

    /// OCR stage settings
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Translation stage settings
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Per-provider connection settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            ocr: OcrConfig::default(),
            translation: TranslationConfig::default(),
            providers: ProvidersConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist. Environment credential overrides are applied in
    /// both cases.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply credential overrides from the environment.
    ///
    /// `DOCTRAN_OPENAI_API_KEY` / `DOCTRAN_ANTHROPIC_API_KEY` take priority;
    /// the conventional `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` are honored
    /// when the prefixed form is unset.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_first(&["DOCTRAN_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            self.providers.openai.api_key = key;
        }
        if let Some(key) = env_first(&["DOCTRAN_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"]) {
            self.providers.anthropic.api_key = key;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ocr.pool_size == 0 {
            anyhow::bail!("ocr.pool_size must be at least 1");
        }
        if self.translation.concurrent_requests == 0 {
            anyhow::bail!("translation.concurrent_requests must be at least 1");
        }
        if self.translation.max_chars_per_chunk == 0 {
            anyhow::bail!("translation.max_chars_per_chunk must be at least 1");
        }
        if self.translation.max_attempts == 0 {
            anyhow::bail!("translation.max_attempts must be at least 1");
        }
        for (name, provider) in [
            ("openai", &self.providers.openai),
            ("anthropic", &self.providers.anthropic),
        ] {
            if !provider.endpoint.is_empty() {
                url::Url::parse(&provider.endpoint).with_context(|| {
                    format!("providers.{}.endpoint is not a valid URL", name)
                })?;
            }
        }
        Ok(())
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// OCR stage configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OcrConfig {
    /// Number of OCR engine instances in the pool; each instance handles one
    /// page at a time
    #[serde(default = "default_ocr_pool_size")]
    pub pool_size: usize,

    /// Which engine implementation to construct
    #[serde(default)]
    pub engine: OcrEngineKind,

    /// Wall-clock bound for a single OCR batch, in seconds
    #[serde(default = "default_ocr_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pool_size: default_ocr_pool_size(),
            engine: OcrEngineKind::default(),
            batch_timeout_secs: default_ocr_batch_timeout_secs(),
        }
    }
}

/// OCR engine implementation selector.
///
/// The mock engine is only ever used when named here explicitly; stage logic
/// never falls through to simulated recognition on its own.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineKind {
    /// Deterministic in-process engine for local verification and tests
    #[default]
    Mock,
}

/// Translation stage configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Maximum number of concurrent provider requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Maximum source characters per translation chunk
    #[serde(default = "default_max_chars_per_chunk")]
    pub max_chars_per_chunk: usize,

    /// Wall-clock bound for a single translation batch, in seconds
    #[serde(default = "default_translation_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Maximum attempts per unit before it is degraded
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Whether to consult the translation cache before calling providers
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: default_concurrent_requests(),
            max_chars_per_chunk: default_max_chars_per_chunk(),
            batch_timeout_secs: default_translation_batch_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

/// Connection settings for all known providers
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    /// OpenAI settings
    #[serde(default = "ProviderConfig::openai_defaults")]
    pub openai: ProviderConfig,

    /// Anthropic settings
    #[serde(default = "ProviderConfig::anthropic_defaults")]
    pub anthropic: ProviderConfig,
}

/// Connection settings for one provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// API key; empty means the provider is unavailable
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service URL; empty uses the provider's public endpoint
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn openai_defaults() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }

    fn anthropic_defaults() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::openai_defaults()
    }
}

/// Log level for the application
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Errors and warnings
    Warn,
    /// Normal operational output
    #[default]
    Info,
    /// Verbose diagnostics
    Debug,
    /// Everything
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_ocr_pool_size() -> usize {
    2
}

fn default_ocr_batch_timeout_secs() -> u64 {
    120
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_max_chars_per_chunk() -> usize {
    1200
}

fn default_translation_batch_timeout_secs() -> u64 {
    180
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_cache_enabled() -> bool {
    true
}

fn default_provider_timeout_secs() -> u64 {
    120
}
