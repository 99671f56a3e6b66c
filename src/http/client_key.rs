//! Deriving a client key from an inbound request.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};
use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::ClientKey;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Picks the identity a request is charged to.
///
/// Precedence: the identity header, then the first `x-forwarded-for` address,
/// then `x-real-ip`, then the socket peer. By default only the socket peer is
/// used. Every header source is client-settable unless an upstream proxy
/// overwrites it, so enable one only behind a proxy that does.
#[derive(Debug, Clone, Default)]
pub struct KeyExtractor {
    identity_header: Option<HeaderName>,
    trust_proxy_headers: bool,
}

impl KeyExtractor {
    pub fn new(identity_header: Option<&str>, trust_proxy_headers: bool) -> Result<Self> {
        let identity_header = identity_header
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    TurnstileError::Config(format!("invalid identity header '{}': {}", name, e))
                })
            })
            .transpose()?;
        Ok(Self {
            identity_header,
            trust_proxy_headers,
        })
    }

    /// Derive the key for a request.
    ///
    /// A request with no identity and no address is an error, never a shared bucket.
    pub fn extract(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<ClientKey> {
        if let Some(identity) = self
            .identity_header
            .as_ref()
            .and_then(|name| header_str(headers, name.as_str()))
        {
            return ClientKey::identity(identity);
        }

        if self.trust_proxy_headers {
            let forwarded = header_str(headers, X_FORWARDED_FOR)
                .and_then(|value| value.split(',').next())
                .and_then(parse_ip);
            if let Some(ip) = forwarded.or_else(|| header_str(headers, X_REAL_IP).and_then(parse_ip)) {
                return Ok(ClientKey::address(ip));
            }
        }

        peer.map(|addr| ClientKey::address(addr.ip())).ok_or_else(|| {
            TurnstileError::InvalidKey("request carries no identity or client address".to_string())
        })
    }

    /// Derive the key from a request's headers and its `ConnectInfo`, if any.
    pub fn extract_request<B>(&self, request: &Request<B>) -> Result<ClientKey> {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        self.extract(request.headers(), peer)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}
