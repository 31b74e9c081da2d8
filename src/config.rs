use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-attempt HTTP timeout.
    pub request_timeout_secs: u64,
    /// Delay before the second attempt; doubled for each one after.
    pub base_backoff_ms: u64,
    /// Spread each backoff by up to ±20%.
    pub jitter: bool,
    /// Characters of response body kept on a delivery row.
    pub response_excerpt_chars: usize,
    /// Deliveries returned per endpoint history listing.
    pub history_limit: usize,
}

impl WebhookConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    /// Process-local store. Secrets are lost on restart.
    Memory,
    /// Remote secret manager reached over HTTP.
    Http,
}

#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    pub backend: VaultBackend,
    pub url: Option<String>,
    pub token: Option<String>,
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // e.g. APP_SERVER__PORT, APP_WEBHOOK__BASE_BACKOFF_MS, APP_VAULT__URL
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.backend == VaultBackend::Http && self.vault.url.is_none() {
            return Err(ConfigError::Message(
                "vault.url is required when vault.backend is \"http\"".to_string(),
            ));
        }
        if self.webhook.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "webhook.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables or config file are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("webhook.request_timeout_secs", 10)?
            .set_default("webhook.base_backoff_ms", 1000)?
            .set_default("webhook.jitter", false)?
            .set_default("webhook.response_excerpt_chars", 1000)?
            .set_default("webhook.history_limit", 50)?
            .set_default("vault.backend", "memory")
    }
}
