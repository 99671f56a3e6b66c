//! Client key construction and validation.

use std::net::IpAddr;

use crate::error::{Result, TurnstileError};

/// A key that identifies the caller a quota is charged to.
///
/// Keys built from an authenticated identity and keys built from a network
/// origin carry different prefixes, so a user id can never collide with an
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from a raw string. Empty or blank strings are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TurnstileError::InvalidKey(
                "client key must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// Create a key from an authenticated identity.
    pub fn identity(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(TurnstileError::InvalidKey(
                "identity must not be empty".to_string(),
            ));
        }
        Ok(Self(format!("user:{}", id)))
    }

    /// Create a key from a network origin.
    pub fn address(ip: IpAddr) -> Self {
        Self(format!("ip:{}", ip))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
