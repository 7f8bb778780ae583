use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PulseError, Result};
use crate::types::SourceKind;

/// Top-level configuration for the Pulse gateway.
///
/// Loaded from `~/.pulse/config.toml` by default. Every section falls back
/// to its defaults, so a partial file (or no file at all) is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl PulseConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PulseConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults only
    /// when the file does not exist. A file that is present but unreadable,
    /// unparsable or invalid is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PulseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the gateway misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        for kind in SourceKind::ALL {
            if self.sources.caps.cap(kind) == 0 {
                return Err(PulseError::Config(format!(
                    "sources.caps.{} must be > 0",
                    kind
                )));
            }
        }
        if self.sources.timeout_secs == 0 {
            return Err(PulseError::Config(
                "sources.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.sources.cache_timeout_secs == 0 {
            return Err(PulseError::Config(
                "sources.cache_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.sources.connect_timeout_secs == 0 {
            return Err(PulseError::Config(
                "sources.connect_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(PulseError::Config(
                "provider.model must not be empty".to_string(),
            ));
        }
        if self.server.max_message_chars == 0 {
            return Err(PulseError::Config(
                "server.max_message_chars must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the cache database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.pulse".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Chat requests allowed per second. 0 disables the limiter.
    pub rate_limit_per_sec: u64,
    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            rate_limit_per_sec: 50,
            max_message_chars: 4000,
        }
    }
}

/// Business-data sources feeding the first-turn context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Deadline for network-backed sources, in seconds.
    pub timeout_secs: u64,
    /// Deadline for cache-backed sources, in seconds.
    pub cache_timeout_secs: u64,
    /// TCP connect timeout for source endpoints, in seconds.
    pub connect_timeout_secs: u64,
    /// Endpoint returning the caller's leads.
    pub leads_url: String,
    /// Endpoint returning the caller's orders.
    pub orders_url: String,
    /// Cache key holding the pre-computed partner listing.
    pub partners_cache_key: String,
    /// Cache key holding the pre-computed product listing.
    pub products_cache_key: String,
    /// Display caps per source.
    #[serde(default)]
    pub caps: DisplayCaps,
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            cache_timeout_secs: 2,
            connect_timeout_secs: 3,
            leads_url: "http://localhost:8080/api/leads".to_string(),
            orders_url: "http://localhost:8080/api/orders".to_string(),
            partners_cache_key: "partners:listing".to_string(),
            products_cache_key: "products:listing".to_string(),
            caps: DisplayCaps::default(),
        }
    }
}

/// Maximum number of records per source included in the composed context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayCaps {
    pub leads: usize,
    pub partners: usize,
    pub products: usize,
    pub orders: usize,
}

impl DisplayCaps {
    pub fn cap(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::Leads => self.leads,
            SourceKind::Partners => self.partners,
            SourceKind::Products => self.products,
            SourceKind::Orders => self.orders,
        }
    }
}

impl Default for DisplayCaps {
    fn default() -> Self {
        Self {
            leads: 15,
            partners: 15,
            products: 20,
            orders: 10,
        }
    }
}

/// Generative-model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model identifier.
    pub model: String,
    /// API base URL (without the `/models/...` suffix).
    pub base_url: String,
    /// API key. Usually supplied through `PULSE_PROVIDER_API_KEY` instead.
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// TCP connect timeout for provider calls, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            temperature: 0.4,
            connect_timeout_secs: 10,
        }
    }
}

/// Where the opaque session token is read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session token.
    pub cookie_name: String,
    /// Header consulted when the cookie is absent.
    pub header_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "pulse_session".to_string(),
            header_name: "x-pulse-session".to_string(),
        }
    }
}
