//! Scan scheduling.
//!
//! All scans, whether fired by the daily timer, the api or startup, go
//! through one worker task fed by a bounded channel. An atomic flag makes a
//! trigger that arrives while a scan is running coalesce instead of queueing
//! a second walk of the same root.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Days, Local, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::scan::{Aggregator, ScanOutcome};
use crate::store::Store;
use crate::util::whole_millis;

/// Something that can produce a snapshot on demand.
pub trait SnapshotSource: Send + Sync + 'static {
    fn scan(&self) -> Result<ScanOutcome>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Scans one configured root with an [`Aggregator`].
pub struct RootScanner {
    root: PathBuf,
    aggregator: Aggregator,
}

impl RootScanner {
    pub fn new(root: PathBuf, aggregator: Aggregator) -> Self {
        RootScanner { root, aggregator }
    }
}

impl SnapshotSource for RootScanner {
    fn scan(&self) -> Result<ScanOutcome> {
        self.aggregator.scan_with_stats(&self.root)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    Scheduled,
    Manual,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A scan was already in flight; this trigger was coalesced into it.
    AlreadyRunning,
    /// The worker task is gone (runtime shutting down).
    Stopped,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatus {
    pub scanning: bool,
    pub last_trigger: Option<TriggerReason>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_snapshot_id: Option<i64>,
    /// Walk bookkeeping of the last scan that reached the end of its root.
    pub last_files_seen: Option<u64>,
    pub last_unreadable_files: Option<u64>,
    pub last_skipped_dirs: Option<u64>,
    pub scans_completed: u64,
    pub scans_failed: u64,
}

struct Pipeline {
    source: Arc<dyn SnapshotSource>,
    store: Arc<Store>,
    scanning: AtomicBool,
    status: watch::Sender<ScanStatus>,
}

impl Pipeline {
    /// Scan, then persist. Errors are returned to the worker, which logs them.
    async fn run_once(&self, reason: TriggerReason) -> Result<i64> {
        self.status.send_modify(|s| {
            s.last_trigger = Some(reason);
            s.last_started = Some(Utc::now());
            s.last_files_seen = None;
            s.last_unreadable_files = None;
            s.last_skipped_dirs = None;
        });
        info!(?reason, root = %self.source.describe(), "scan started");

        let source = Arc::clone(&self.source);
        let outcome = tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        // recorded before the write so a failed save still shows what was walked
        self.status.send_modify(|s| {
            s.last_files_seen = Some(outcome.files_seen);
            s.last_unreadable_files = Some(outcome.unreadable_files);
            s.last_skipped_dirs = Some(outcome.skipped_dirs);
        });

        let snapshot = outcome.snapshot;

        let store = Arc::clone(&self.store);
        let id = tokio::task::spawn_blocking(move || store.store(&snapshot))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        Ok(id)
    }

    fn finish(&self, result: &Result<i64>, elapsed: Duration) {
        self.status.send_modify(|s| {
            s.scanning = false;
            s.last_finished = Some(Utc::now());
            s.last_duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
            match result {
                Ok(id) => {
                    s.last_error = None;
                    s.last_snapshot_id = Some(*id);
                    s.scans_completed += 1;
                }
                Err(e) => {
                    s.last_error = Some(e.to_string());
                    s.scans_failed += 1;
                }
            }
            // released inside the status update so a waiter that sees the
            // scheduler idle can immediately trigger again
            self.scanning.store(false, Ordering::Release);
        });
    }
}

#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    tx: mpsc::Sender<TriggerReason>,
}

impl Scheduler {
    /// Spawns the worker task. Must be called from within a tokio runtime.
    pub fn start(source: Arc<dyn SnapshotSource>, store: Arc<Store>) -> Self {
        let (status, _) = watch::channel(ScanStatus::default());
        let pipeline = Arc::new(Pipeline {
            source,
            store,
            scanning: AtomicBool::new(false),
            status,
        });

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(worker(Arc::clone(&pipeline), rx));

        Scheduler { pipeline, tx }
    }

    /// Requests a scan without waiting for it.
    pub fn trigger(&self, reason: TriggerReason) -> TriggerOutcome {
        let acquired = self
            .pipeline
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !acquired {
            info!(?reason, "scan already in progress, trigger coalesced");
            return TriggerOutcome::AlreadyRunning;
        }

        self.pipeline.status.send_modify(|s| s.scanning = true);

        match self.tx.try_send(reason) {
            Ok(()) => TriggerOutcome::Started,
            Err(e) => {
                warn!(?reason, error = %e, "scan worker unavailable");
                self.pipeline.status.send_modify(|s| {
                    s.scanning = false;
                    self.pipeline.scanning.store(false, Ordering::Release);
                });
                TriggerOutcome::Stopped
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.pipeline.scanning.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ScanStatus {
        self.pipeline.status.borrow().clone()
    }

    /// Resolves once no scan is in flight.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.pipeline.status.subscribe();
        let _ = rx.wait_for(|s| !s.scanning).await;
    }

    /// Fires a scan every day at `hour` local time.
    pub fn spawn_daily(&self, hour: u32) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = next_run_after(&now, hour);
                let wait = (next.clone() - now).to_std().unwrap_or(Duration::ZERO);
                info!(next_run = %next.to_rfc3339(), "daily scan scheduled");

                tokio::time::sleep(wait).await;

                if scheduler.trigger(TriggerReason::Scheduled) == TriggerOutcome::Stopped {
                    break;
                }
            }
        })
    }
}

async fn worker(pipeline: Arc<Pipeline>, mut rx: mpsc::Receiver<TriggerReason>) {
    while let Some(reason) = rx.recv().await {
        let started = Instant::now();
        let result = pipeline.run_once(reason).await;

        match &result {
            Ok(id) => info!(
                snapshot_id = id,
                elapsed = %humantime::format_duration(whole_millis(started.elapsed())),
                "snapshot stored"
            ),
            Err(e) => error!(error = %e, "scan cycle failed, no snapshot stored"),
        }

        pipeline.finish(&result, started.elapsed());
    }
}

/// Next instant strictly after `now` at `hour`:00 local time. Days where that
/// wall-clock time does not exist (DST gap) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let today = now.date_naive();
    for offset in 0..=2 {
        let Some(naive) = (today + Days::new(offset)).and_hms_opt(hour, 0, 0) else {
            continue;
        };
        if let Some(candidate) = now.timezone().from_local_datetime(&naive).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }
    now.clone() + chrono::Duration::days(1)
}
