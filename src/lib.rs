//! Turnstile - In-Memory Fixed-Window Rate Limiting
//!
//! This crate implements a per-client fixed-window rate limiter and the HTTP
//! boundary that consumes it: an axum middleware that answers over-quota
//! requests with 429 and `Retry-After`, and a standalone decision service.
//! Counters live in process memory; every instance enforces its own quota.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
