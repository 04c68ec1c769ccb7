//! Timeline reads and exports.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use warden_core::Timestamp;
use warden_journal::export::{ExportFormat, export as render};

use crate::api::api_error;
use crate::state::AppState;

/// Bound on `GET /timeline`.
const RECENT_LIMIT: usize = 200;

/// `GET /timeline` — most recent records, newest first, bounded.
pub async fn recent(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({ "events": state.journal.recent(RECENT_LIMIT) })).into_response()
}

/// Body of `POST /timeline/replay`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// Range start, milliseconds since epoch.
    from_ts: i64,
    /// Range end, milliseconds since epoch.
    to_ts: i64,
    /// Optional cap on returned records.
    #[serde(default)]
    limit: Option<usize>,
}

/// `POST /timeline/replay` — range query over the journal.
pub async fn replay(
    State(state): State<AppState>,
    Json(request): Json<ReplayRequest>,
) -> Response {
    let (Some(from), Some(to)) = (
        Timestamp::from_millis(request.from_ts),
        Timestamp::from_millis(request.to_ts),
    ) else {
        return api_error(StatusCode::BAD_REQUEST, "timestamp out of range");
    };
    if from > to {
        return api_error(StatusCode::BAD_REQUEST, "fromTs must not exceed toTs");
    }

    Json(serde_json::json!({ "events": state.journal.range(from, to, request.limit) }))
        .into_response()
}

/// `GET /timeline.ndjson` — the full timeline as NDJSON.
pub async fn ndjson(State(state): State<AppState>) -> Response {
    let body = render(&state.journal.all(), ExportFormat::Ndjson);
    (
        [("content-type", ExportFormat::Ndjson.content_type())],
        body,
    )
        .into_response()
}

/// Query for `GET /timeline/export`.
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// One of `ndjson`, `json`, `csv`, `md`.
    format: ExportFormat,
}

/// `GET /timeline/export?format=` — the timeline in any supported format.
pub async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let body = render(&state.journal.all(), query.format);
    ([("content-type", query.format.content_type())], body).into_response()
}
