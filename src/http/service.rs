//! Decision API handlers.

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::response::decision_response;
use super::GateState;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::ClientKey;

/// Largest accepted `/v1/check` body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Body of a `POST /v1/check` call.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckRequest {
    /// Caller identity to charge. When absent the key is derived from the
    /// request itself, the same way the middleware does.
    #[serde(default)]
    pub key: Option<String>,
    /// Request path used to pick a route rule
    #[serde(default)]
    pub path: Option<String>,
}

/// Routes of the standalone decision service.
pub fn router(state: GateState) -> Router {
    Router::new()
        .route("/v1/check", post(check))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Count one request for the caller and report the decision.
#[instrument(skip_all)]
async fn check(State(state): State<GateState>, request: Request) -> Result<Response> {
    let derived = state.extractor.extract_request(&request);

    let bytes = to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| TurnstileError::InvalidRequest(e.to_string()))?;
    let body = if bytes.is_empty() {
        CheckRequest::default()
    } else {
        let Json(body) = Json::<CheckRequest>::from_bytes(&bytes)
            .map_err(|e| TurnstileError::InvalidRequest(e.body_text()))?;
        body
    };

    let key = match body.key {
        Some(key) => ClientKey::new(key)?,
        None => derived?,
    };
    let path = body.path.as_deref().unwrap_or("/");

    let (route, limiter) = state.registry.resolve(path);
    let decision = limiter.check_now(&key);

    debug!(key = %key, route = route, decision = ?decision, "Rate limit decision made");

    Ok(decision_response(route, decision))
}

async fn health(State(state): State<GateState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "limiters": state.registry.limiter_count(),
        "counters": state.registry.counter_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::KeyExtractor;
    use crate::ratelimit::{LimiterRegistry, ManualClock, RateLimitRule, RateLimitRules, StoreKind};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, StatusCode};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(max_requests: u64) -> Router {
        let rules = RateLimitRules::with_default(RateLimitRule::new(max_requests, 1000));
        let registry =
            LimiterRegistry::from_rules(rules, StoreKind::Locked, Arc::new(ManualClock::default())).unwrap();
        router(GateState::new(Arc::new(registry), KeyExtractor::default()))
    }

    fn check_request(body: serde_json::Value) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_check_admits_then_rejects() {
        let app = app(1);
        let body = serde_json::json!({ "key": "tenant-1", "path": "/orders" });

        let response = app.clone().oneshot(check_request(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["decision"], "admitted");
        assert_eq!(json["route"], "default");
        assert_eq!(json["remaining"], 0);

        let response = app.oneshot(check_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
        let json = json_body(response).await;
        assert_eq!(json["decision"], "rejected");
        assert_eq!(json["retry_after_ms"], 1000);
    }

    #[tokio::test]
    async fn test_zero_quota_rejects_first_check() {
        let response = app(0)
            .oneshot(check_request(serde_json::json!({ "key": "k" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_empty_key_is_bad_request() {
        let response = app(5)
            .oneshot(check_request(serde_json::json!({ "key": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], 400);
    }

    #[tokio::test]
    async fn test_missing_key_without_client_address_is_bad_request() {
        let response = app(5)
            .oneshot(check_request(serde_json::json!({ "path": "/orders" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], 400);
        assert!(json["message"].as_str().unwrap().contains("Invalid client key"));
    }

    #[tokio::test]
    async fn test_missing_key_charges_peer_address() {
        let app = app(1);
        let peer: SocketAddr = "198.51.100.20:7000".parse().unwrap();

        for expected in [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let mut req = check_request(serde_json::json!({ "path": "/orders" }));
            req.extensions_mut().insert(ConnectInfo(peer));
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), expected);
        }

        // An explicit key is charged separately from the peer
        let mut req = check_request(serde_json::json!({ "key": "tenant-9" }));
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_identity_header_used_when_configured() {
        let rules = RateLimitRules::with_default(RateLimitRule::new(1, 1000));
        let registry =
            LimiterRegistry::from_rules(rules, StoreKind::Sharded, Arc::new(ManualClock::default())).unwrap();
        let extractor = KeyExtractor::new(Some("x-tenant"), false).unwrap();
        let app = router(GateState::new(Arc::new(registry), extractor));

        let request = |tenant: &str| {
            axum::http::Request::builder()
                .method("POST")
                .uri("/v1/check")
                .header("x-tenant", tenant)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(request("a")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.clone().oneshot(request("a")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(app.oneshot(request("b")).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app(5).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], 400);
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let app = app(5);
        app.clone()
            .oneshot(check_request(serde_json::json!({ "key": "a" })))
            .await
            .unwrap();

        let response = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["counters"], 1);
        assert_eq!(json["limiters"], 1);
    }
}
