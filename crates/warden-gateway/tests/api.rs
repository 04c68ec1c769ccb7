//! End-to-end tests against the assembled router, in-memory state.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use warden_gateway::{WardenConfig, api, build_app_state, spawn_background_tasks};

const API_KEY: &str = "test-key";

async fn test_app() -> Router {
    let mut config = WardenConfig::default();
    config.storage.ephemeral = true;
    config.server.api_keys = vec![API_KEY.to_string()];
    config.consent.sweep_interval_secs = 1;

    let (state, webhook_rx) = build_app_state(Arc::new(config)).await.expect("boot");
    let _tasks = spawn_background_tasks(&state, webhook_rx);
    api::router(state)
}

async fn request(app: &Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", format!("Bearer {API_KEY}"));
    let request = if let Some(body) = body {
        builder = builder.header("content-type", "application/json");
        builder.body(Body::from(body.to_string())).unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/timeline")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // /healthz stays open.
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_decide_without_key_or_token_is_401() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/decide")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"agent": "a", "intent": "llm.chat"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// S1 — allow by default
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_allow_by_default() {
    let app = test_app().await;
    let (status, body) = request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "a", "intent": "llm.chat", "target": "gpt-4"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "allow");
    assert!(body["id"].as_str().unwrap().starts_with("evt_"));
    assert!(body.get("durationMs").is_some());
}

// ---------------------------------------------------------------------------
// S2 — ask then grant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ask_then_grant_with_token() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "b", "overrides": {"ask": ["slack.post:*"]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, decision) = request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "b", "intent": "slack.post", "target": "#general"})),
    )
    .await;
    assert_eq!(decision["status"], "ask");
    let event_id = decision["id"].as_str().unwrap().to_string();

    // The human allows and grants a token scoped to the asked intent.
    let (status, verdict) = request(
        &app,
        "POST",
        &format!("/decide/{event_id}"),
        Some(json!({"verdict": "allow", "grantToken": {"durationSec": 600}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["ok"], true);

    // The long-poll sees the allow plus the granted token.
    let (status, awaited) = request(&app, "POST", &format!("/await/{event_id}"), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(awaited["status"], "allow");
    let scopes: Vec<String> =
        serde_json::from_value(awaited["token"]["scopes"].clone()).unwrap();
    assert_eq!(scopes, vec!["slack.post"]);
}

#[tokio::test]
async fn test_conflicting_human_verdict_is_conflict() {
    let app = test_app().await;
    request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "b", "overrides": {"ask": ["slack.post:*"]}})),
    )
    .await;
    let (_, decision) = request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "b", "intent": "slack.post"})),
    )
    .await;
    let event_id = decision["id"].as_str().unwrap().to_string();

    request(
        &app,
        "POST",
        &format!("/decide/{event_id}"),
        Some(json!({"verdict": "block"})),
    )
    .await;
    let (status, _) = request(
        &app,
        "POST",
        &format!("/decide/{event_id}"),
        Some(json!({"verdict": "allow"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// S3/S4 — token authorizes, revocation falls back to policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_token_flow() {
    let app = test_app().await;

    request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "c", "overrides": {"ask": ["calendar.*", "email.send:*"]}})),
    )
    .await;

    let (status, issued) = request(
        &app,
        "POST",
        "/tokens/issue",
        Some(json!({
            "agent": "c",
            "scopes": ["calendar.read", "calendar.write", "email.send"],
            "durationSec": 3600,
            "reason": "integration test",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = issued["token"]["token"].as_str().unwrap().to_string();

    // A valid token in the body stands in for the API key on /decide.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/decide")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "agent": "c",
                        "intent": "calendar.write",
                        "target": "cal1",
                        "token": &token,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let decision: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decision["status"], "allow");
    assert_eq!(decision["policy"]["byToken"], true);

    // An out-of-scope intent ignores the token and asks per policy.
    let (_, decision) = request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "c", "intent": "email.send", "target": "x@y.com"})),
    )
    .await;
    assert_eq!(decision["status"], "ask");

    let (_, introspection) =
        request(&app, "POST", "/tokens/introspect", Some(json!({"token": &token}))).await;
    assert_eq!(introspection["active"], true);

    // Revoke; the same call now asks.
    let (status, _) = request(&app, "POST", "/tokens/revoke", Some(json!({"token": &token}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, decision) = request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "c", "intent": "calendar.write", "target": "cal1", "token": &token})),
    )
    .await;
    assert_eq!(decision["status"], "ask");

    // Revocation is disclosed; only unknown/expired tokens are anonymous.
    let (_, introspection) =
        request(&app, "POST", "/tokens/introspect", Some(json!({"token": &token}))).await;
    assert_eq!(introspection["active"], false);
    assert_eq!(introspection["status"], "revoked");

    let (_, introspection) = request(
        &app,
        "POST",
        "/tokens/introspect",
        Some(json!({"token": "wdn_never_issued"})),
    )
    .await;
    assert_eq!(introspection, json!({"active": false}));
}

// ---------------------------------------------------------------------------
// S5 — spend cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_spend_cap_blocks_seventh() {
    let app = test_app().await;
    request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "d", "overrides": {"limits": {"llm_daily_usd": 1.0}}})),
    )
    .await;

    let mut blocked_at = None;
    for i in 1..=10 {
        let (_, decision) = request(
            &app,
            "POST",
            "/decide",
            Some(json!({"agent": "d", "intent": "llm.chat", "costUsd": 0.15})),
        )
        .await;
        if decision["status"] == "block" && blocked_at.is_none() {
            blocked_at = Some((i, decision));
        }
    }

    let (index, decision) = blocked_at.expect("cap must block");
    assert_eq!(index, 7);
    assert_eq!(decision["policy"]["source"], "limit");
    assert_eq!(decision["policy"]["limit"]["category"], "llm");
    assert_eq!(decision["policy"]["limit"]["timeframe"], "daily");
    let spent = decision["policy"]["limit"]["spent"].as_f64().unwrap();
    assert!((spent - 0.9).abs() < 1e-9);

    let (_, metrics) = request(&app, "GET", "/metrics/llm", None).await;
    let row = metrics["summary"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["agent"] == "d")
        .unwrap();
    assert!((row["dailyUsd"].as_f64().unwrap() - 0.9).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// S7 — input filter test surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_input_filter_endpoint() {
    let app = test_app().await;

    let (status, report) = request(
        &app,
        "POST",
        "/input-filter/test",
        Some(json!({"content": "contact john@x.com, ssn 123-45-6789", "policy": "strict"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["ok"], true);
    assert_eq!(report["allowed"], true);
    assert_eq!(
        report["sanitized"],
        "contact [REDACTED:email], ssn [REDACTED:ssn]"
    );

    let (_, report) = request(
        &app,
        "POST",
        "/input-filter/test",
        Some(json!({"content": "'; DROP TABLE users; --", "policy": "permissive"})),
    )
    .await;
    assert_eq!(report["allowed"], true);
    assert!(report["classifications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "sql_injection"));

    let (_, report) = request(
        &app,
        "POST",
        "/input-filter/test",
        Some(json!({"content": "'; DROP TABLE users; --", "policy": "strict"})),
    )
    .await;
    assert_eq!(report["allowed"], false);
}

// ---------------------------------------------------------------------------
// Policy dry run, timeline, scopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_policy_test_is_side_effect_free() {
    let app = test_app().await;
    request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "a", "overrides": {"block": ["exec.run"]}})),
    )
    .await;

    let (status, report) = request(
        &app,
        "POST",
        "/policy/test",
        Some(json!({"agent": "a", "intent": "exec.run"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["ok"], true);
    assert_eq!(report["status"], "block");
    assert_eq!(report["signature"], "exec.run");

    // Dry runs leave no journal trace beyond the role application.
    let (_, timeline) = request(&app, "GET", "/timeline", None).await;
    let events = timeline["events"].as_array().unwrap();
    assert!(events.iter().all(|e| e["type"] != "event"));
}

#[tokio::test]
async fn test_timeline_records_and_replays() {
    let app = test_app().await;
    request(
        &app,
        "POST",
        "/decide",
        Some(json!({"agent": "a", "intent": "llm.chat"})),
    )
    .await;
    request(
        &app,
        "POST",
        "/events",
        Some(json!({"agent": "a", "intent": "email.send", "costUsd": 0.01})),
    )
    .await;

    let (_, timeline) = request(&app, "GET", "/timeline", None).await;
    let events = timeline["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    // Newest first.
    assert_eq!(events[0]["intent"], "email.send");

    let (_, replayed) = request(
        &app,
        "POST",
        "/timeline/replay",
        Some(json!({"fromTs": 0, "toTs": 4_102_444_800_000_i64})),
    )
    .await;
    assert_eq!(replayed["events"].as_array().unwrap().len(), 2);

    // NDJSON export.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/timeline.ndjson")
                .header("authorization", format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn test_scopes_and_roles_surface() {
    let app = test_app().await;

    let (_, scopes) = request(&app, "GET", "/scopes", None).await;
    assert!(scopes["scopes"]["llm.chat"].is_string());

    let (status, _) = request(&app, "GET", "/roles/unbound-agent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = request(
        &app,
        "POST",
        "/roles/apply",
        Some(json!({"agentId": "x", "template": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_webhook_crud() {
    let app = test_app().await;

    let (status, body) = request(
        &app,
        "POST",
        "/webhooks",
        Some(json!({"url": "https://example.com/hook", "secret": "s"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["webhooks"][0], "https://example.com/hook");

    let (_, body) = request(
        &app,
        "DELETE",
        "/webhooks",
        Some(json!({"url": "https://example.com/hook"})),
    )
    .await;
    assert_eq!(body["webhooks"].as_array().unwrap().len(), 0);

    let (status, _) = request(&app, "POST", "/webhooks", Some(json!({"url": "ftp://x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_template_validation_endpoint() {
    let app = test_app().await;
    let (_, body) = request(
        &app,
        "POST",
        "/templates/validate",
        Some(json!({"yaml": "name: t\nallow: [llm.chat]\nmystery: 1\n"})),
    )
    .await;
    assert_eq!(body["valid"], true);
    assert!(body["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|w| w.as_str().unwrap().contains("mystery")));

    let (_, body) = request(
        &app,
        "POST",
        "/templates/validate",
        Some(json!({"yaml": "allow: [llm.chat]\n"})),
    )
    .await;
    assert_eq!(body["valid"], false);
}
