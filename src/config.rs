//! Service configuration
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file and `WINDOW_CONTEXT__<SECTION>__<KEY>` environment
//! variables, e.g. `WINDOW_CONTEXT__CONTEXT__DEFAULT_MAX_TOKENS=6000`.

use crate::error::{ContextError, Result};
use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "WINDOW_CONTEXT";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load defaults, then `path` if it exists, then the environment.
    /// A `.env` file in the working directory is read first.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config: Config = ::config::Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("context.default_limit", self.context.default_limit),
            ("context.default_max_tokens", self.context.default_max_tokens),
            ("context.recent_window", self.context.recent_window),
            ("context.fetch_multiplier", self.context.fetch_multiplier),
            ("extraction.max_quantity", self.extraction.max_quantity as usize),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ContextError::Configuration(format!(
                    "{key} must be greater than zero"
                )));
            }
        }
        if self.storage.purge_interval_secs == 0 {
            return Err(ContextError::Configuration(
                "storage.purge_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Context window sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Messages returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Token budget when the caller gives none
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    /// Most recent messages always kept verbatim by the summarizer
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// History fetched per request is `limit * fetch_multiplier`...
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    /// ...but never less than this
    #[serde(default = "default_min_fetch")]
    pub min_fetch: usize,
}

fn default_limit() -> usize {
    10
}

fn default_max_tokens() -> usize {
    4000
}

fn default_recent_window() -> usize {
    10
}

fn default_fetch_multiplier() -> usize {
    3
}

fn default_min_fetch() -> usize {
    30
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_max_tokens: default_max_tokens(),
            recent_window: default_recent_window(),
            fetch_multiplier: default_fetch_multiplier(),
            min_fetch: default_min_fetch(),
        }
    }
}

impl ContextConfig {
    /// Number of stored messages to read for a request of `limit` messages
    pub fn fetch_size(&self, limit: usize) -> usize {
        limit.saturating_mul(self.fetch_multiplier).max(self.min_fetch)
    }
}

/// Specification extraction limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Largest quantity accepted from "N windows" phrasings
    #[serde(default = "default_max_quantity")]
    pub max_quantity: u32,
}

fn default_max_quantity() -> u32 {
    99
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_quantity: default_max_quantity(),
        }
    }
}

/// Conversation store housekeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Idle time after which a conversation is purged
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,

    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// Display name for conversations created implicitly
    #[serde(default = "default_display_name")]
    pub default_display_name: String,
}

fn default_conversation_ttl() -> u64 {
    86_400
}

fn default_purge_interval() -> u64 {
    3_600
}

fn default_display_name() -> String {
    "Customer".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversation_ttl_secs: default_conversation_ttl(),
            purge_interval_secs: default_purge_interval(),
            default_display_name: default_display_name(),
        }
    }
}

impl StorageConfig {
    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
