//! Axum routes and handlers of the mock backend.
//!
//! The log endpoint implements the subset of HTTP Range the real backend
//! supports: open-ended `bytes=N-` requests answered with `206` and a
//! `Content-Range`, `416` with `Content-Range: bytes */T` when the start is
//! at or past the end, and the full body otherwise.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::Stream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::logmock::LogStore;
use crate::printer::channel::PrinterRequest;
use crate::printer::files::{self, FileEntry};
use crate::printer::{PrinterCommand, PrinterSnapshot};
use crate::web::models::{
    ActionResponse, DoParams, ErrorResponse, FanRequest, InfoResponse, PrintRequest,
};

/// Baseline memory figures reported by `info.json`, matching the real
/// device's order of magnitude.
const TOTAL_MEM: u64 = 114_208_768;
const BASE_FREE_MEM: u64 = 43_442_176;

pub struct SystemDiag {
    pub started_at: Instant,
    pub ssh_status: u8,
}

pub struct AppStateInner {
    pub printer_tx: mpsc::Sender<PrinterRequest>,
    pub updates: broadcast::Sender<PrinterSnapshot>,
    pub log: LogStore,
    pub files: Vec<FileEntry>,
    pub system: Mutex<SystemDiag>,
}

pub type AppState = Arc<AppStateInner>;

/// Creates the Axum router with all the mock API endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files/log", get(serve_log))
        .route("/api/info.json", get(system_info))
        .route("/api/do.json", get(do_action))
        .route("/api/printer", get(printer_snapshot))
        .route("/api/printer/files", get(printer_files))
        .route("/api/printer/events", get(printer_events))
        .route("/api/printer/print", post(start_print))
        .route("/api/printer/pause", post(pause_print))
        .route("/api/printer/resume", post(resume_print))
        .route("/api/printer/stop", post(stop_print))
        .route("/api/printer/fan", post(set_fan))
        .with_state(state)
}

/// Parse an open-ended `Range: bytes=N-` header. Other range forms are not
/// supported and fall back to a full response, like the real backend.
fn parse_range_start(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(header::RANGE)?.to_str().ok()?;
    raw.strip_prefix("bytes=")?.strip_suffix('-')?.parse().ok()
}

async fn serve_log(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::HEAD {
        let total = state.log.len().await;
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain".to_string()),
                (header::CONTENT_LENGTH, total.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::empty(),
        )
            .into_response();
    }

    if let Some(start) = parse_range_start(&headers) {
        return match state.log.slice_from(start).await {
            Some((bytes, total)) => {
                let end = start + bytes.len() as u64 - 1;
                (
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE, "text/plain".to_string()),
                        (
                            header::CONTENT_RANGE,
                            format!("bytes {}-{}/{}", start, end, total),
                        ),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                    ],
                    Body::from(bytes),
                )
                    .into_response()
            }
            None => {
                let total = state.log.len().await;
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [
                        (header::CONTENT_RANGE, format!("bytes */{}", total)),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                    ],
                    Body::from("Range Not Satisfiable"),
                )
                    .into_response()
            }
        };
    }

    let content = state.log.content().await;
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from(content),
    )
        .into_response()
}

fn format_uptime(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

async fn system_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let (uptime_secs, ssh_status) = {
        let system = state.system.lock().unwrap_or_else(|e| e.into_inner());
        (system.started_at.elapsed().as_secs(), system.ssh_status)
    };

    // Fluctuating load figures, like a real busy SoC.
    let cpu_use = 40 + (rand::random::<f64>() * 40.0) as u64;
    let cpu_usr_use = cpu_use / 2;
    let mem_variation = ((rand::random::<f64>() * 10.0) as i64 - 5) * 1024 * 1024;
    let free_mem = BASE_FREE_MEM
        .saturating_add_signed(mem_variation)
        .clamp(30_000_000, TOTAL_MEM);

    Json(InfoResponse {
        api_ver: 1,
        total_mem: TOTAL_MEM,
        free_mem,
        free_mem_per: free_mem * 100 / TOTAL_MEM,
        cpu_use,
        cpu_usr_use,
        cpu_sys_use: cpu_use - cpu_usr_use,
        cpu_idle: 100 - cpu_use,
        ssh_status,
        uptime: format_uptime(uptime_secs),
    })
}

async fn do_action(
    State(state): State<AppState>,
    Query(params): Query<DoParams>,
) -> Json<ActionResponse> {
    let action = params.action.unwrap_or_default();
    let result = match action.as_str() {
        "reboot" => {
            tracing::info!("Reboot requested, resetting uptime");
            let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
            system.started_at = Instant::now();
            1
        }
        "poweroff" => {
            tracing::info!("Poweroff requested");
            1
        }
        "ssh_start" => {
            let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
            system.ssh_status = 2;
            2
        }
        "ssh_stop" => {
            let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
            system.ssh_status = 0;
            1
        }
        "ssh_restart" => {
            {
                let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
                system.ssh_status = 1;
            }
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
                system.ssh_status = 2;
            });
            1
        }
        "log_clear" => {
            tracing::info!("Log clear requested");
            state.log.clear().await;
            1
        }
        // Unknown remote commands are logged and ignored.
        other => {
            tracing::warn!("Unknown do.json action '{}', ignoring", other);
            -1
        }
    };
    Json(ActionResponse { api_ver: 1, result })
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn task_unavailable() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "printer task unavailable".to_string(),
        }),
    )
}

async fn send_command(state: &AppState, command: PrinterCommand) -> Result<(), ApiError> {
    let (respond_to, response) = oneshot::channel();
    state
        .printer_tx
        .send(PrinterRequest::Command {
            command,
            respond_to,
        })
        .await
        .map_err(|_| task_unavailable())?;
    match response.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(_) => Err(task_unavailable()),
    }
}

async fn fetch_snapshot(state: &AppState) -> Result<PrinterSnapshot, ApiError> {
    let (respond_to, response) = oneshot::channel();
    state
        .printer_tx
        .send(PrinterRequest::Snapshot { respond_to })
        .await
        .map_err(|_| task_unavailable())?;
    response.await.map_err(|_| task_unavailable())
}

async fn printer_snapshot(
    State(state): State<AppState>,
) -> Result<Json<PrinterSnapshot>, ApiError> {
    Ok(Json(fetch_snapshot(&state).await?))
}

async fn printer_files(State(state): State<AppState>) -> Json<Vec<FileEntry>> {
    Json(state.files.clone())
}

async fn start_print(
    State(state): State<AppState>,
    Json(payload): Json<PrintRequest>,
) -> Result<StatusCode, ApiError> {
    let size_hint = files::size_of(&state.files, &payload.filename);
    send_command(
        &state,
        PrinterCommand::Print {
            filename: payload.filename,
            size_hint,
        },
    )
    .await?;
    Ok(StatusCode::OK)
}

async fn pause_print(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send_command(&state, PrinterCommand::Pause).await?;
    Ok(StatusCode::OK)
}

async fn resume_print(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send_command(&state, PrinterCommand::Resume).await?;
    Ok(StatusCode::OK)
}

async fn stop_print(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send_command(&state, PrinterCommand::Stop).await?;
    Ok(StatusCode::OK)
}

async fn set_fan(
    State(state): State<AppState>,
    Json(payload): Json<FanRequest>,
) -> Result<StatusCode, ApiError> {
    send_command(&state, PrinterCommand::SetFan { speed: payload.speed }).await?;
    Ok(StatusCode::OK)
}

/// SSE stream of printer snapshots: the current snapshot first, then one
/// event per simulation update.
async fn printer_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut updates = state.updates.subscribe();
    let initial = fetch_snapshot(&state).await.ok();

    let stream = async_stream::stream! {
        if let Some(snapshot) = initial {
            if let Ok(event) = Event::default().event("printer_updated").json_data(&snapshot) {
                yield Ok(event);
            }
        }
        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    if let Ok(event) = Event::default().event("printer_updated").json_data(&snapshot) {
                        yield Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("SSE subscriber lagged, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range_start(&headers_with_range("bytes=0-")), Some(0));
        assert_eq!(
            parse_range_start(&headers_with_range("bytes=1234-")),
            Some(1234)
        );
        // Closed and suffix ranges are unsupported
        assert_eq!(parse_range_start(&headers_with_range("bytes=0-100")), None);
        assert_eq!(parse_range_start(&headers_with_range("bytes=-100")), None);
        assert_eq!(parse_range_start(&headers_with_range("lines=5-")), None);
        assert_eq!(parse_range_start(&HeaderMap::new()), None);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(3_725), "01:02:05");
        assert_eq!(format_uptime(86_400), "24:00:00");
    }
}
