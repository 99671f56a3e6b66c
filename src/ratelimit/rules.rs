//! Rate limit rules configuration and matching.
//!
//! Rules map request paths to quotas. A rules file has one default rule and
//! any number of route rules keyed by path prefix; the longest matching prefix
//! wins.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::window::Quota;
use crate::error::{Result, TurnstileError};

/// A complete set of rate limit rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Rule applied to paths that match no route
    pub default: RateLimitRule,
    /// Route-specific rules
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A rule bound to a path prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// Unique route name, used in logs and responses
    pub name: String,
    /// Request paths starting with this prefix use this rule
    pub path_prefix: String,
    #[serde(flatten)]
    pub limit: RateLimitRule,
}

/// A quota as written in configuration.
///
/// Exactly one of `window_ms` and `unit` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Number of requests allowed per window
    pub max_requests: u64,
    /// Window length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
    /// Window length as a named unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TimeUnit>,
}

/// Named window lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of this unit in milliseconds.
    pub fn as_millis(&self) -> u64 {
        match self {
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }
}

impl RateLimitRule {
    pub fn new(max_requests: u64, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms: Some(window_ms),
            unit: None,
        }
    }

    /// Resolve this rule into a validated quota.
    pub fn quota(&self) -> Result<Quota> {
        let window_ms = match (self.window_ms, self.unit) {
            (Some(ms), None) => ms,
            (None, Some(unit)) => unit.as_millis(),
            (Some(_), Some(_)) => {
                return Err(TurnstileError::Config(
                    "set either window_ms or unit, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(TurnstileError::Config(
                    "one of window_ms or unit is required".to_string(),
                ))
            }
        };
        Quota::new(self.max_requests, window_ms)
    }
}

impl RateLimitRules {
    /// Rules with only a default quota.
    pub fn with_default(default: RateLimitRule) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string. The rules are validated before returning.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RateLimitRules = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse rate limit rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check every quota and reject duplicate route names.
    pub fn validate(&self) -> Result<()> {
        self.default
            .quota()
            .map_err(|e| TurnstileError::Config(format!("default rule: {}", e)))?;

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.name.trim().is_empty() {
                return Err(TurnstileError::Config("route name must not be empty".to_string()));
            }
            if !seen.insert(route.name.as_str()) {
                return Err(TurnstileError::Config(format!(
                    "duplicate route name '{}'",
                    route.name
                )));
            }
            route
                .limit
                .quota()
                .map_err(|e| TurnstileError::Config(format!("route '{}': {}", route.name, e)))?;
        }
        Ok(())
    }

    /// Find the route rule for a request path.
    ///
    /// Prefixes match whole path segments, so `/login` covers `/login/otp`
    /// but not `/loginhelp`. The longest matching prefix wins. Returns `None`
    /// when the default rule applies.
    pub fn match_route(&self, path: &str) -> Option<&RouteRule> {
        self.routes
            .iter()
            .filter(|route| prefix_matches(&route.path_prefix, path))
            .max_by_key(|route| route.path_prefix.len())
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
