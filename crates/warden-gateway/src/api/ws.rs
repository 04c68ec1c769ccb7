//! The WebSocket stream of journal records.
//!
//! Clients receive one JSON frame per record, mirroring the journal shape
//! (`{type, cursor, ...}`). Clients send nothing; on drop they reconnect
//! and resync via `POST /timeline/replay` or the journal tail cursor.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth;
use crate::state::AppState;

/// Query params for the upgrade. Browsers cannot set headers on WebSocket
/// connects, so the key may ride in the query string instead.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    api_key: Option<String>,
}

/// `GET /ws` — upgrade to the event stream.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let mut headers = headers;
    if let Some(key) = query.api_key {
        if let Ok(value) = axum::http::HeaderValue::from_str(&key) {
            headers.insert("x-api-key", value);
        }
    }
    if !auth::key_is_valid(&state.api_key_hashes, &headers) {
        return (StatusCode::UNAUTHORIZED, "invalid or missing API key").into_response();
    }

    ws.on_upgrade(move |socket| stream_records(socket, state))
        .into_response()
}

async fn stream_records(socket: WebSocket, state: AppState) {
    let (id, mut records) = state.bus.subscribe();
    let (mut sink, mut inbound) = socket.split();
    tracing::debug!(subscription = %id, "websocket subscriber connected");

    loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else {
                    // Bus gone or this subscriber overflowed; the client
                    // reconnects and resyncs from the journal.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let Ok(frame) = serde_json::to_string(record.as_ref()) else {
                    continue;
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = inbound.next() => {
                match incoming {
                    // Clients send nothing meaningful; tolerate pings.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Binary(_))) => {},
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }
    tracing::debug!(subscription = %id, "websocket subscriber disconnected");
}
