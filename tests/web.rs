//! Integration tests for the mock HTTP API, driving the router directly
//! with `tower::ServiceExt::oneshot`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tower::util::ServiceExt;

use kobra_mock::config::{LogMockConfig, SimulatorConfig};
use kobra_mock::logmock::LogStore;
use kobra_mock::printer::channel;
use kobra_mock::printer::files;
use kobra_mock::printer::simulator::Simulator;
use kobra_mock::web::api::{self, AppStateInner, SystemDiag};

struct TestApp {
    app: Router,
    log: LogStore,
}

/// Build the full router with a real simulator task behind it. The tick
/// interval is long enough that no tick fires during a test; all state
/// changes happen through commands.
fn test_app() -> TestApp {
    let log = LogStore::new(&LogMockConfig {
        seed_history: false,
        ..LogMockConfig::default()
    });

    let simulator = Simulator::new(SimulatorConfig::default());
    let (printer_tx, printer_rx) = mpsc::channel(16);
    let (updates, _) = broadcast::channel(16);
    tokio::spawn(channel::run(
        simulator,
        printer_rx,
        updates.clone(),
        Duration::from_secs(3600),
    ));

    let state = Arc::new(AppStateInner {
        printer_tx,
        updates,
        log: log.clone(),
        files: files::generate_listing(),
        system: Mutex::new(SystemDiag {
            started_at: Instant::now(),
            ssh_status: 2,
        }),
    });
    TestApp {
        app: api::router(state),
        log,
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::empty())
        .unwrap()
}

fn header_str<'a>(response: &'a axum::response::Response, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn log_full_fetch() {
    let t = test_app();
    let expected = t.log.content().await;

    let response = t.app.oneshot(get("/files/log")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
    let body = body_bytes(response).await;
    assert_eq!(body, expected.as_bytes());
}

#[tokio::test]
async fn log_head_reports_size_without_body() {
    let t = test_app();
    let total = t.log.len().await;

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/files/log")
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_LENGTH),
        total.to_string()
    );
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn log_open_ended_range_returns_partial_content() {
    let t = test_app();
    let content = t.log.content().await;
    let total = content.len() as u64;
    let start = 10u64;

    let request = Request::builder()
        .uri("/files/log")
        .header(header::RANGE, format!("bytes={}-", start))
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        format!("bytes {}-{}/{}", start, total - 1, total)
    );
    let body = body_bytes(response).await;
    assert_eq!(body, &content.as_bytes()[start as usize..]);
}

#[tokio::test]
async fn log_range_at_end_is_unsatisfiable() {
    let t = test_app();
    let total = t.log.len().await;

    let request = Request::builder()
        .uri("/files/log")
        .header(header::RANGE, format!("bytes={}-", total))
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        format!("bytes */{}", total)
    );
}

#[tokio::test]
async fn log_closed_range_falls_back_to_full_body() {
    let t = test_app();
    let expected = t.log.content().await;

    let request = Request::builder()
        .uri("/files/log")
        .header(header::RANGE, "bytes=0-100")
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, expected.as_bytes());
}

#[tokio::test]
async fn log_grows_between_range_polls() {
    let t = test_app();
    let before = t.log.len().await;
    t.log.append_growth_line().await;

    let request = Request::builder()
        .uri("/files/log")
        .header(header::RANGE, format!("bytes={}-", before))
        .body(Body::empty())
        .unwrap();
    let response = t.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with('\n'));
    assert!(body.contains("System check completed"));
}

#[tokio::test]
async fn info_reports_plausible_figures() {
    let t = test_app();
    let response = t.app.oneshot(get("/api/info.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;

    assert_eq!(info["api_ver"], 1);
    assert_eq!(info["ssh_status"], 2);
    let cpu = info["cpu_use"].as_u64().unwrap();
    assert!((40..=80).contains(&cpu));
    let free = info["free_mem"].as_u64().unwrap();
    assert!(free <= info["total_mem"].as_u64().unwrap());
    let uptime = info["uptime"].as_str().unwrap();
    assert_eq!(uptime.len(), 8);
    assert_eq!(uptime.matches(':').count(), 2);
}

#[tokio::test]
async fn do_action_toggles_ssh() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(get("/api/do.json?action=ssh_stop"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["result"], 1);

    let info = body_json(t.app.clone().oneshot(get("/api/info.json")).await.unwrap()).await;
    assert_eq!(info["ssh_status"], 0);

    let response = t
        .app
        .clone()
        .oneshot(get("/api/do.json?action=ssh_start"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["result"], 2);

    let info = body_json(t.app.oneshot(get("/api/info.json")).await.unwrap()).await;
    assert_eq!(info["ssh_status"], 2);
}

#[tokio::test]
async fn do_action_unknown_is_ignored() {
    let t = test_app();
    let response = t
        .app
        .oneshot(get("/api/do.json?action=format_disk"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let action = body_json(response).await;
    assert_eq!(action["api_ver"], 1);
    assert_eq!(action["result"], -1);
}

#[tokio::test]
async fn do_action_log_clear_rotates_the_log() {
    let t = test_app();
    let before = t.log.len().await;

    let response = t
        .app
        .oneshot(get("/api/do.json?action=log_clear"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["result"], 1);

    let after = t.log.len().await;
    assert!(after < before);
    assert!(t.log.content().await.contains("Log cleared"));
}

#[tokio::test]
async fn printer_snapshot_starts_free() {
    let t = test_app();
    let response = t.app.oneshot(get("/api/printer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["state"], "free");
    assert_eq!(snapshot["print_job"], Value::Null);
    assert_eq!(snapshot["nozzle_temp"], "25");
    assert_eq!(snapshot["model_id"], "20021");
}

#[tokio::test]
async fn printer_files_lists_gcode() {
    let t = test_app();
    let response = t.app.oneshot(get("/api/printer/files")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    let entries = listing.as_array().unwrap();
    assert!(entries.len() > 50);
    assert!(
        entries
            .iter()
            .any(|e| e["filename"] == "benchy.gcode" && e["size"].as_u64().unwrap() > 0)
    );
}

#[tokio::test]
async fn print_command_moves_printer_to_downloading() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/printer/print",
            json!({"filename": "benchy.gcode"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = body_json(t.app.oneshot(get("/api/printer")).await.unwrap()).await;
    assert_eq!(snapshot["state"], "downloading");
    assert_eq!(snapshot["print_job"]["filename"], "benchy.gcode");
    assert_eq!(snapshot["print_job"]["progress"], 0);
}

#[tokio::test]
async fn print_while_busy_conflicts() {
    let t = test_app();
    let first = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/printer/print",
            json!({"filename": "benchy.gcode"}),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = t
        .app
        .oneshot(post_json(
            "/api/printer/print",
            json!({"filename": "vase_spiral.gcode"}),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error = body_json(second).await;
    assert!(error["error"].as_str().unwrap().contains("downloading"));
}

#[tokio::test]
async fn pause_without_active_print_conflicts() {
    let t = test_app();
    let response = t
        .app
        .oneshot(post_empty("/api/printer/pause"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stop_fails_the_running_job() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/printer/print",
            json!({"filename": "benchy.gcode"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .app
        .clone()
        .oneshot(post_empty("/api/printer/stop"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = body_json(t.app.oneshot(get("/api/printer")).await.unwrap()).await;
    assert_eq!(snapshot["state"], "failed");
    assert_eq!(snapshot["print_job"]["state"], "failed");
}

#[tokio::test]
async fn fan_speed_requires_active_job() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/printer/fan", json!({"speed": 80})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/printer/print",
            json!({"filename": "benchy.gcode"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/printer/fan", json!({"speed": 80})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = body_json(t.app.oneshot(get("/api/printer")).await.unwrap()).await;
    assert_eq!(snapshot["print_job"]["fan_speed"], 80);
}
