//! Wire-level endpoints.
//!
//! Convention: HTTP status codes carry the error class (400 validation,
//! 401 auth, 404 not found, 503 unavailable/overload); error bodies are
//! `{"error": "<machine-readable>"}`. Decisions themselves are always 200
//! with a `status` field — a `block` is data, not an HTTP failure.

pub mod decide;
pub mod observe;
pub mod policy;
pub mod timeline;
pub mod tokens;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// A 503 with `Retry-After` for overload conditions.
pub(crate) fn overloaded(message: impl Into<String>) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [("retry-after", "1")],
        axum::Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// Assemble the full application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    // `/decide` authenticates inside the handler (a valid agent token in
    // the body stands in for an API key); `/healthz` and `/ws` manage their
    // own access.
    let open = Router::new()
        .route("/decide", post(decide::decide))
        .route("/healthz", get(observe::healthz))
        .route("/ws", get(ws::upgrade));

    let protected = Router::new()
        .route("/decide/:id", post(decide::human_verdict))
        .route("/await/:id", post(decide::await_verdict))
        .route("/events", post(decide::record_event))
        .route("/timeline", get(timeline::recent))
        .route("/timeline/replay", post(timeline::replay))
        .route("/timeline.ndjson", get(timeline::ndjson))
        .route("/timeline/export", get(timeline::export))
        .route("/tokens/issue", post(tokens::issue))
        .route("/tokens/introspect", post(tokens::introspect))
        .route("/tokens/pause", post(tokens::pause))
        .route("/tokens/resume", post(tokens::resume))
        .route("/tokens/revoke", post(tokens::revoke))
        .route("/tokens/list", get(tokens::list))
        .route("/templates", get(policy::list_templates))
        .route("/templates/validate", post(policy::validate_template))
        .route("/roles/apply", post(policy::apply_role))
        .route("/roles", get(policy::list_roles))
        .route("/roles/:agent_id", get(policy::get_role))
        .route("/policy/test", post(policy::test_policy))
        .route("/input-filter/test", post(policy::test_filter))
        .route(
            "/webhooks",
            get(observe::list_webhooks)
                .post(observe::add_webhook)
                .delete(observe::remove_webhook),
        )
        .route("/metrics/llm", get(observe::llm_metrics))
        .route("/metrics/chaos", get(observe::chaos_metrics))
        .route("/scopes", get(observe::scopes))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    open.merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
