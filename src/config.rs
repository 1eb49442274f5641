//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::federation::SignaturePadding;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub actor: ActorConfig,
    pub federation: FederationConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Local actor served by this instance
#[derive(Debug, Clone, Deserialize)]
pub struct ActorConfig {
    /// Username (default: "admin")
    #[serde(default = "default_actor_username")]
    pub username: String,
    /// Display name (default: "Admin")
    #[serde(default = "default_actor_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub summary: String,
    /// PEM private key; generated on first start if missing
    pub private_key_path: PathBuf,
    /// PEM public key; written next to a generated private key
    pub public_key_path: PathBuf,
}

fn default_actor_username() -> String {
    "admin".to_string()
}

fn default_actor_display_name() -> String {
    "Admin".to_string()
}

/// Federation behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Accepted `Date` skew for inbound signatures (default: 43200 = 12h)
    pub max_date_skew_seconds: u64,
    /// RSA padding for outbound signatures: "pkcs1v15" or "pss"
    #[serde(default)]
    pub signing_padding: SignaturePadding,
    /// Allow loopback and private targets (debug builds only)
    #[serde(default)]
    pub allow_local_targets: bool,
    /// Outbound request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
    /// User-Agent for outbound requests
    pub user_agent: String,
}

impl FederationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Profile cache TTL in seconds (default: 86400)
    pub profile_ttl: u64,
    /// Maximum cached profiles (default: 10000)
    pub max_profiles: usize,
    /// Seconds between sweeps of expired profiles (default: 300)
    #[serde(default = "default_prune_interval")]
    pub prune_interval_seconds: u64,
}

fn default_prune_interval() -> u64 {
    300
}

impl CacheConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDIKIT__SECTION__KEY)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("actor.private_key_path", "data/private.pem")?
            .set_default("actor.public_key_path", "data/public.pem")?
            .set_default("federation.max_date_skew_seconds", 43200)?
            .set_default("federation.signing_padding", "pkcs1v15")?
            .set_default("federation.allow_local_targets", false)?
            .set_default("federation.request_timeout_seconds", 30)?
            .set_default(
                "federation.user_agent",
                concat!("fedikit/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("cache.profile_ttl", 86400)?
            .set_default("cache.max_profiles", 10000)?
            .set_default("cache.prune_interval_seconds", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEDIKIT__*)
            .add_source(
                Environment::with_prefix("FEDIKIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        let protocol = self.server.protocol.as_str();
        if protocol != "http" && protocol != "https" {
            return Err(crate::error::AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                protocol
            )));
        }

        if self.server.domain.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "server.domain must not be empty".to_string(),
            ));
        }

        if self.federation.max_date_skew_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "federation.max_date_skew_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.request_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "federation.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.cache.prune_interval_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "cache.prune_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.actor.username.is_empty()
            || !self
                .actor
                .username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(crate::error::AppError::Config(format!(
                "actor.username must be non-empty and use [A-Za-z0-9_], got {:?}",
                self.actor.username
            )));
        }

        if self.federation.allow_local_targets {
            tracing::warn!("federation.allow_local_targets is set; only honoured in debug builds");
        }

        Ok(())
    }
}
