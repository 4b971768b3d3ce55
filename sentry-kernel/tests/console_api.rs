use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use sentry_devkit::{SnapshotBuilder, TestHarness};
use sentry_kernel::health::HealthTracker;
use sentry_kernel::http::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

fn app(h: &TestHarness) -> Router {
    build_router(AppState {
        engine: h.engine.clone(),
        health_tracker: HealthTracker::new(),
    })
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post_mode(app: &Router, channel: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, channel, Some("application/json"), serde_json::to_string(&body).unwrap()).await
}

async fn post_raw(app: &Router, channel: &str, content_type: Option<&str>, body: String) -> (StatusCode, Value) {
    let mut req = Request::builder().method("POST").uri(format!("/control/{channel}"));
    if let Some(ct) = content_type {
        req = req.header("Content-Type", ct);
    }
    let response = app
        .clone()
        .oneshot(req.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_telemetry_view_live() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);

    h.push(
        SnapshotBuilder::normal(7)
            .ts_server(3_723_000)
            .temperature(25.34)
            .luz(812.0)
            .estado("ALERTA GAS")
            .build(),
    )
    .await
    .unwrap();

    let (status, body) = get_json(&app, "/telemetry").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["telemetry"]["T"], 25.34);
    assert_eq!(body["telemetry"]["estado"], "ALERTA GAS");
    assert_eq!(body["freshness"]["liveness"]["state"], "LIVE");
    assert_eq!(body["tone"], "warning");
    assert_eq!(body["luz_nivel"], "ALTA");
    assert_eq!(body["readings"]["T"], "25.3");
    assert_eq!(body["readings"]["luz"], "812");
    assert_eq!(body["readings"]["gas"], "--");
    assert_eq!(body["ts_server_clock"], "01:02:03");
    assert_eq!(body["net"]["ok"], true);

    h.shutdown().await;
}

#[tokio::test]
async fn test_telemetry_view_offline() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);

    let (_, body) = get_json(&app, "/telemetry").await;
    assert_eq!(body["telemetry"]["estado"], "OFFLINE");
    assert_eq!(body["telemetry"]["motivo"], "STALE DATA");
    assert_eq!(body["telemetry"]["online"], false);
    assert_eq!(body["freshness"]["liveness"]["reason"], "STALE DATA");
    assert_eq!(body["tone"], "offline");
    assert_eq!(body["ts_server_clock"], "--:--:--");

    let (status, health) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["stale"], true);
    h.shutdown().await;
}

#[tokio::test]
async fn test_history_routes() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);
    h.advance(1000);
    h.push(SnapshotBuilder::normal(1).humidity(55.0).ts_ms(900).build())
        .await
        .unwrap();

    let (status, body) = get_json(&app, "/history/H").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["range"], json!({"min": 0.0, "max": 100.0}));
    assert_eq!(body["points"], json!([{"t": 900, "v": 55.0}]));

    let (_, all) = get_json(&app, "/history").await;
    assert_eq!(all["H"], json!([{"t": 900, "v": 55.0}]));
    assert_eq!(all["T"], json!([]));

    let (status, _) = get_json(&app, "/history/pressure").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    h.shutdown().await;
}

#[tokio::test]
async fn test_control_request_and_view() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);
    h.advance(42);

    let (status, body) = post_mode(&app, "fan", json!({"mode": "auto"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"ok": true, "channel": "fan", "mode": "AUTO"}));
    assert_eq!(h.store.ctrl(), json!({"fanMode": "AUTO", "ts_ms": 42}));

    // pas d'écho encore : l'état désiré n'a pas bougé
    let (_, view) = get_json(&app, "/control").await;
    assert_eq!(view["desired"]["fanMode"], "OFF");

    h.store.echo_ctrl(&h.engine.sender()).await;
    h.view().await.unwrap();
    let (_, view) = get_json(&app, "/control").await;
    assert_eq!(view["fan"]["desired"], "AUTO");
    assert_eq!(view["fan"]["actual_on"], false);
    assert_eq!(view["ctrl_net"]["ok"], true);
    h.shutdown().await;
}

#[tokio::test]
async fn test_control_request_rejects_bad_input() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);

    let (status, body) = post_mode(&app, "pump", json!({"mode": "ON"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, _) = post_mode(&app, "luz", json!({"mode": "BLINK"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.store.get_writes().is_empty());
    h.shutdown().await;
}

#[tokio::test]
async fn test_control_request_rejects_malformed_body() {
    let h = TestHarness::new(4000, 60);
    let app = app(&h);

    // `mode` manquant
    let (status, body) = post_mode(&app, "fan", json!({"state": "ON"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["msg"].is_string());

    // pas du JSON
    let (status, body) = post_raw(&app, "fan", Some("application/json"), "mode=ON".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    // sans Content-Type
    let (status, _) = post_raw(&app, "fan", None, r#"{"mode":"ON"}"#.into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.store.get_writes().is_empty());
    h.shutdown().await;
}
