//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::{RateLimitRule, RateLimitRules, StoreKind};

/// Prefix for environment overrides, e.g. `TURNSTILE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML rules file; when unset the default quota below applies to every path
    pub rules_path: Option<String>,

    /// Requests per window when no rules file is given
    #[serde(default = "default_max_requests")]
    pub default_max_requests: u64,

    /// Window length in milliseconds when no rules file is given
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// How often expired windows are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Counter store implementation
    #[serde(default)]
    pub store: StoreKind,

    /// Header carrying the caller identity. Only set this when an upstream
    /// auth layer overwrites the header; otherwise clients pick their own key.
    #[serde(default)]
    pub identity_header: Option<String>,

    /// Derive client addresses from `x-forwarded-for` / `x-real-ip`.
    /// Only safe behind a proxy that rewrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            default_max_requests: default_max_requests(),
            default_window_ms: default_window_ms(),
            sweep_interval_secs: default_sweep_interval(),
            store: StoreKind::default(),
            identity_header: None,
            trust_proxy_headers: false,
        }
    }
}

fn default_max_requests() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_sweep_interval() -> u64 {
    30
}

impl RateLimitingConfig {
    /// Load the rules file if one is configured, otherwise build rules from the defaults.
    pub fn load_rules(&self) -> Result<RateLimitRules> {
        match &self.rules_path {
            Some(path) => RateLimitRules::from_file(path),
            None => {
                let rules = RateLimitRules::with_default(RateLimitRule::new(
                    self.default_max_requests,
                    self.default_window_ms,
                ));
                rules.validate()?;
                Ok(rules)
            }
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional file, overlaid with environment variables.
    ///
    /// The file format is picked from its extension (YAML, TOML or JSON).
    /// Environment variables use the `TURNSTILE__` prefix with `__` between
    /// nesting levels.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}
