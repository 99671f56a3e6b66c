//! HTTP boundary: client key derivation, middleware, and the decision service.

mod client_key;
mod middleware;
mod response;
mod server;
mod service;

use std::sync::Arc;

use crate::ratelimit::LimiterRegistry;

pub use client_key::KeyExtractor;
pub use middleware::{protect, rate_limit};
pub use response::{decision_response, retry_after_secs, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
pub use server::HttpServer;
pub use service::{router, CheckRequest};

/// State shared by the middleware and the decision handlers.
#[derive(Clone)]
pub struct GateState {
    pub registry: Arc<LimiterRegistry>,
    pub extractor: Arc<KeyExtractor>,
}

impl GateState {
    pub fn new(registry: Arc<LimiterRegistry>, extractor: KeyExtractor) -> Self {
        Self {
            registry,
            extractor: Arc::new(extractor),
        }
    }
}
