use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use dronetrack_rs::{
    config::Config,
    pipeline::milestones::CompletionResult,
    routes,
    state::AppState,
    types::order::OrderRecord,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        tick_interval: Duration::from_millis(50),
        ..Config::default()
    }
}

fn app_with(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::tracking::router())
        .merge(routes::render::router())
        .with_state(state)
}

fn app() -> Router {
    app_with(AppState::new(test_config()))
}

fn order(id: &str) -> Value {
    json!({
        "id": id,
        "createdAt": (Utc::now() - chrono::Duration::minutes(5)).to_rfc3339(),
        "estimatedDeliveryMinutes": 15,
        "restaurantName": "Pho 24",
        "restaurantAddress": { "latitude": 10.7765, "longitude": 106.7004 },
        "address": { "latitude": 10.7807, "longitude": 106.7009 }
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).expect("json"))
}

#[tokio::test]
async fn start_tracking_returns_snapshot() {
    let app = app();
    let (status, snapshot) = send_json(&app, "POST", "/api/tracking", Some(order("it-1"))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(snapshot["order_id"], "it-1");
    assert_eq!(snapshot["status"], "en_route");
    assert_eq!(snapshot["restaurant_name"], "Pho 24");
    let percent = snapshot["progress_percent"].as_f64().expect("percent");
    assert!(percent > 0.0 && percent < 100.0, "progress {percent}");
    assert!(snapshot["eta_label"]
        .as_str()
        .expect("eta label")
        .starts_with("Arriving"));
    assert!(snapshot["warnings"].as_array().expect("warnings").is_empty());

    let (status, fetched) = send_json(&app, "GET", "/api/tracking/it-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_id"], "it-1");
}

#[tokio::test]
async fn repeated_start_keeps_live_session() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-2"))).await;
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/tracking/it-2/progress",
        Some(json!({ "progress": 0.6 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, again) = send_json(&app, "POST", "/api/tracking", Some(order("it-2"))).await;
    assert!(again["progress_percent"].as_f64().expect("percent") >= 60.0);

    let (_, health) = send_json(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions"], 1);
}

#[tokio::test]
async fn malformed_order_is_tracked_with_warnings() {
    let app = app();
    let (status, snapshot) = send_json(&app, "POST", "/api/tracking", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!snapshot["order_id"].as_str().expect("generated id").is_empty());
    assert!(snapshot["warnings"].as_array().expect("warnings").len() >= 4);
    assert_eq!(snapshot["status"], "en_route");
}

#[tokio::test]
async fn progress_reports_are_monotone_and_fire_milestones() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-3"))).await;

    let (_, halfway) = send_json(
        &app,
        "POST",
        "/api/tracking/it-3/progress",
        Some(json!({ "progress": 0.5 })),
    )
    .await;
    let halfway_percent = halfway["progress_percent"].as_f64().expect("percent");
    assert!(halfway_percent >= 50.0);
    assert!(halfway["milestones"]
        .as_array()
        .expect("milestones")
        .contains(&json!("one_third")));

    let (_, lower) = send_json(
        &app,
        "POST",
        "/api/tracking/it-3/progress",
        Some(json!({ "progress": 0.1 })),
    )
    .await;
    assert!(lower["progress_percent"].as_f64().expect("percent") >= halfway_percent);

    let (_, arrived) = send_json(
        &app,
        "POST",
        "/api/tracking/it-3/progress",
        Some(json!({ "progress": 100 })),
    )
    .await;
    assert_eq!(arrived["status"], "delivered");
    assert_eq!(arrived["progress_percent"], 100.0);
    assert_eq!(arrived["eta_label"], "Delivered");
    assert_eq!(arrived["distance_label"], "Arrived");
    assert_eq!(arrived["milestones"], json!(["one_third", "two_third", "arrival"]));
    assert_eq!(arrived["position"], arrived["destination"]);
}

#[tokio::test]
async fn completion_handler_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let state = AppState::new(test_config()).with_completion(Arc::new(
        move |_: &OrderRecord| -> CompletionResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    ));
    let app = app_with(state);

    send_json(&app, "POST", "/api/tracking", Some(order("it-4"))).await;
    for _ in 0..3 {
        send_json(
            &app,
            "POST",
            "/api/tracking/it-4/progress",
            Some(json!({ "progress": 1.0 })),
        )
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_completion_handler_becomes_a_warning() {
    let state = AppState::new(test_config()).with_completion(Arc::new(
        |_: &OrderRecord| -> CompletionResult { Err("storefront unreachable".into()) },
    ));
    let app = app_with(state);

    send_json(&app, "POST", "/api/tracking", Some(order("it-5"))).await;
    let (status, arrived) = send_json(
        &app,
        "POST",
        "/api/tracking/it-5/progress",
        Some(json!({ "progress": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(arrived["status"], "delivered");
    let warnings = arrived["warnings"].as_array().expect("warnings");
    assert!(warnings
        .iter()
        .any(|w| w.as_str().unwrap_or_default().contains("storefront unreachable")));
}

#[tokio::test]
async fn invalid_progress_is_rejected() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-6"))).await;
    let (status, json) = send_json(
        &app,
        "POST",
        "/api/tracking/it-6/progress",
        Some(json!({ "progress": -3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().expect("error").contains("Invalid progress"));
}

#[tokio::test]
async fn route_view_is_in_viewport_space() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-7"))).await;
    let (status, view) = send_json(&app, "GET", "/api/tracking/it-7/route", None).await;

    assert_eq!(status, StatusCode::OK);
    let path = view["flight_path"].as_array().expect("flight path");
    assert_eq!(path.len(), 49);
    assert_eq!(path[0], view["origin"]);
    for key in ["origin", "destination", "marker"] {
        let left = view[key]["left"].as_f64().expect("left");
        let top = view[key]["top"].as_f64().expect("top");
        assert!((0.0..=100.0).contains(&left) && (0.0..=100.0).contains(&top));
    }
}

#[tokio::test]
async fn ticker_advances_progress() {
    let app = app();
    let (_, started) = send_json(&app, "POST", "/api/tracking", Some(order("it-8"))).await;
    let before = started["progress_percent"].as_f64().expect("percent");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let (_, later) = send_json(&app, "GET", "/api/tracking/it-8", None).await;
    assert!(later["progress_percent"].as_f64().expect("percent") > before);
}

#[tokio::test]
async fn delete_cancels_and_forgets_session() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-9"))).await;

    let (status, last) = send_json(&app, "DELETE", "/api/tracking/it-9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["status"], "cancelled");

    let (status, json) = send_json(&app, "GET", "/api/tracking/it-9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().expect("error").contains("it-9"));
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = app();
    for (method, uri) in [
        ("GET", "/api/tracking/nope"),
        ("DELETE", "/api/tracking/nope"),
        ("GET", "/api/tracking/nope/route"),
        ("GET", "/api/tracking/nope/trail.gpx"),
    ] {
        let (status, _) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test]
async fn map_png_and_gpx_export() {
    let app = app();
    send_json(&app, "POST", "/api/tracking", Some(order("it-10"))).await;
    send_json(
        &app,
        "POST",
        "/api/tracking/it-10/progress",
        Some(json!({ "progress": 0.7 })),
    )
    .await;

    let (status, png) = send(&app, "GET", "/api/tracking/it-10/map.png?theme=night", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&png[1..4], b"PNG");

    let (status, gpx) = send(&app, "GET", "/api/tracking/it-10/trail.gpx", None).await;
    assert_eq!(status, StatusCode::OK);
    let gpx = String::from_utf8(gpx).expect("utf8");
    assert!(gpx.contains("<trkpt"));
    assert!(gpx.contains("Order it-10 from Pho 24"));

    let (status, _) = send(&app, "GET", "/api/tracking/it-10/map.png?theme=neon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
