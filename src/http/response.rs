//! Mapping limiter decisions onto HTTP responses.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ratelimit::Decision;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// JSON body describing a decision.
#[derive(Debug, Serialize)]
pub struct DecisionBody<'a> {
    pub route: &'a str,
    #[serde(flatten)]
    pub decision: Decision,
}

/// Whole seconds until retry, rounded up so clients never retry early.
pub fn retry_after_secs(retry_after_ms: u64) -> u64 {
    retry_after_ms.div_ceil(1000)
}

/// Add quota headers for `decision` to `headers`.
pub fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining()));
    if let Some(retry_after_ms) = decision.retry_after_ms() {
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs(retry_after_ms)),
        );
    }
}

/// A 200 or 429 response carrying the decision as JSON plus quota headers.
pub fn decision_response(route: &str, decision: Decision) -> Response {
    let status = if decision.is_admitted() {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };

    let mut response = (status, Json(DecisionBody { route, decision })).into_response();
    apply_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(1), 1);
        assert_eq!(retry_after_secs(1000), 1);
        assert_eq!(retry_after_secs(1001), 2);
        assert_eq!(retry_after_secs(59_999), 60);
    }

    #[test]
    fn test_rejected_response_headers() {
        let response = decision_response(
            "login",
            Decision::Rejected { limit: 5, retry_after_ms: 2500 },
        );

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "5");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
    }

    #[test]
    fn test_admitted_response_headers() {
        let response = decision_response("default", Decision::Admitted { limit: 5, remaining: 4 });

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "4");
    }

    #[test]
    fn test_body_shape() {
        let body = DecisionBody {
            route: "login",
            decision: Decision::Admitted { limit: 5, remaining: 4 },
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["route"], "login");
        assert_eq!(json["decision"], "admitted");
        assert_eq!(json["remaining"], 4);
    }
}
