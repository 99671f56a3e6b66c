//! Axum middleware that enforces the limiter in front of a router.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{trace, warn};

use super::response::{apply_headers, decision_response};
use super::GateState;

/// Check the caller's quota before running the rest of the stack.
///
/// Rejected requests get a 429 without reaching the inner service. Admitted
/// requests are forwarded and the response gains quota headers.
pub async fn rate_limit(State(state): State<GateState>, request: Request, next: Next) -> Response {
    let key = match state.extractor.extract_request(&request) {
        Ok(key) => key,
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "Could not derive client key");
            return e.into_response();
        }
    };

    let (route, limiter) = state.registry.resolve(request.uri().path());
    let decision = limiter.check_now(&key);
    trace!(key = %key, route = route, admitted = decision.is_admitted(), "Request gated");

    if !decision.is_admitted() {
        return decision_response(route, decision);
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Wrap every route of `router` with the rate limit middleware.
pub fn protect<S>(router: Router<S>, state: GateState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, rate_limit))
}
