//! HTTP query/control surface.
//!
//! Thin axum handlers over [`Store`] and [`Scheduler`]. Store calls are
//! offloaded to the blocking pool so queries never wait on a running scan.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::scheduler::{ScanStatus, Scheduler, TriggerOutcome, TriggerReason};
use crate::snapshot::Snapshot;
use crate::store::{Store, Timeframe};

/// Application context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub scheduler: Scheduler,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/scan", post(trigger_scan))
        .route("/api/scan/status", get(scan_status))
        .route("/api/stats", get(latest_stats))
        .route("/api/history", get(history))
        .route("/api/files/types", get(file_types))
        .with_state(state)
}

/// Serves the api until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http api ready");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Error body: `{"error": "..."}` with 400 for bad input, 500 otherwise.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

async fn with_store<T, F>(store: &Arc<Store>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ScanAck {
    pub status: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    pub timeframe: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FileTypeSize {
    #[serde(rename = "type")]
    pub extension: String,
    pub size: u64,
}

pub async fn health() -> &'static str {
    "ok"
}

/// Fire-and-forget: acknowledges before the scan runs.
pub async fn trigger_scan(State(state): State<AppState>) -> (StatusCode, Json<ScanAck>) {
    let (code, status) = match state.scheduler.trigger(TriggerReason::Manual) {
        TriggerOutcome::Started => (StatusCode::OK, "Scan started"),
        TriggerOutcome::AlreadyRunning => (StatusCode::OK, "Scan already in progress"),
        TriggerOutcome::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "Scanner unavailable"),
    };
    (code, Json(ScanAck { status: status.to_string() }))
}

pub async fn scan_status(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scheduler.status())
}

/// Latest snapshot, serialized as `null` when none exists yet.
pub async fn latest_stats(State(state): State<AppState>) -> std::result::Result<Json<Option<Snapshot>>, ApiError> {
    let latest = with_store(&state.store, |store| store.get_latest()).await?;
    Ok(Json(latest))
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> std::result::Result<Json<Vec<Snapshot>>, ApiError> {
    let timeframe = match params.timeframe.as_deref() {
        Some(raw) => raw.parse::<Timeframe>()?,
        None => Timeframe::default(),
    };
    let snapshots = with_store(&state.store, move |store| store.get_history(timeframe)).await?;
    Ok(Json(snapshots))
}

/// Per-extension sizes of the latest snapshot, largest first.
pub async fn file_types(State(state): State<AppState>) -> std::result::Result<Json<Vec<FileTypeSize>>, ApiError> {
    let latest = with_store(&state.store, |store| store.get_latest()).await?;
    let types = latest
        .map(|snapshot| {
            snapshot
                .file_types_by_size()
                .into_iter()
                .map(|(ext, size)| FileTypeSize {
                    extension: ext.to_string(),
                    size,
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanOutcome;
    use crate::scheduler::SnapshotSource;
    use crate::snapshot::now_millis;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    struct StaticSource(Snapshot);

    impl SnapshotSource for StaticSource {
        fn scan(&self) -> Result<ScanOutcome> {
            let mut snapshot = self.0.clone();
            snapshot.timestamp = now_millis();
            Ok(snapshot.into())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn sample() -> Snapshot {
        let mut file_types = BTreeMap::new();
        file_types.insert(".txt".to_string(), 100);
        file_types.insert(".log".to_string(), 50);
        Snapshot {
            timestamp: now_millis(),
            total_size: 150,
            file_types,
            folders: Vec::new(),
        }
    }

    /// Holds each scan open until the test sends on the gate.
    struct HeldSource {
        gate: Mutex<std_mpsc::Receiver<()>>,
        calls: AtomicUsize,
    }

    impl SnapshotSource for HeldSource {
        fn scan(&self) -> Result<ScanOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.lock().unwrap().recv();
            Ok(sample().into())
        }

        fn describe(&self) -> String {
            "held".to_string()
        }
    }

    fn state() -> AppState {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let scheduler = Scheduler::start(Arc::new(StaticSource(sample())), Arc::clone(&store));
        AppState { store, scheduler }
    }

    #[tokio::test]
    async fn stats_is_null_before_first_scan() {
        let state = state();
        let Json(latest) = latest_stats(State(state)).await.unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn scan_then_stats_and_history() {
        let state = state();

        let (code, Json(ack)) = trigger_scan(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(ack.status, "Scan started");
        state.scheduler.wait_until_idle().await;

        let Json(latest) = latest_stats(State(state.clone())).await.unwrap();
        assert_eq!(latest.unwrap().total_size, 150);

        let Json(week) = history(State(state.clone()), Query(HistoryParams::default()))
            .await
            .unwrap();
        assert_eq!(week.len(), 1);

        let Json(types) = file_types(State(state)).await.unwrap();
        assert_eq!(
            types,
            vec![
                FileTypeSize { extension: ".txt".to_string(), size: 100 },
                FileTypeSize { extension: ".log".to_string(), size: 50 },
            ]
        );
    }

    #[tokio::test]
    async fn second_scan_request_while_running_is_coalesced() {
        let (release, gate) = std_mpsc::channel();
        let source = Arc::new(HeldSource {
            gate: Mutex::new(gate),
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(Store::open_in_memory().unwrap());
        let scheduler = Scheduler::start(source.clone(), Arc::clone(&store));
        let state = AppState { store, scheduler };

        let (code, Json(first)) = trigger_scan(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(first.status, "Scan started");

        let (code, Json(second)) = trigger_scan(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(second.status, "Scan already in progress");

        release.send(()).unwrap();
        state.scheduler.wait_until_idle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.store.list().unwrap().len(), 1);
        let Json(status) = scan_status(State(state)).await;
        assert_eq!(status.scans_completed, 1);
    }

    #[tokio::test]
    async fn unknown_timeframe_is_a_bad_request() {
        let state = state();
        let params = HistoryParams {
            timeframe: Some("century".to_string()),
        };
        let Err(err) = history(State(state), Query(params)).await else {
            panic!("century must be rejected");
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn store_errors_map_to_server_error() {
        let response = ApiError(Error::Config("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn file_types_empty_without_data() {
        let Json(types) = file_types(State(state())).await.unwrap();
        assert!(types.is_empty());
    }

    #[tokio::test]
    async fn status_reflects_completed_scan() {
        let state = state();
        trigger_scan(State(state.clone())).await;
        state.scheduler.wait_until_idle().await;

        let Json(status) = scan_status(State(state)).await;
        assert!(!status.scanning);
        assert_eq!(status.scans_completed, 1);
        assert_eq!(status.last_trigger, Some(TriggerReason::Manual));
        assert_eq!(status.last_skipped_dirs, Some(0));
    }
}
