use std::sync::Arc;
use std::time::Duration;

use residio_core::config::DEBT_SCAN_INTERVAL_SECS;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::Clock;
use crate::debt::{DebtScanner, ScanReport};
use crate::error::{Result, SchedulerError};
use crate::store::StoreFactory;

/// Where the loop currently is. The cycle is `Scanning → Sleeping → Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Scanning,
    Sleeping,
}

/// Snapshot published after every state change, read by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: LoopState,
    /// Completed cycles, failed ones included.
    pub cycles: u64,
    /// ISO-8601 instant the most recent scan was run for.
    pub last_scan_at: Option<String>,
    pub last_report: Option<ScanReport>,
    /// Error text of the most recent cycle, cleared by the next success.
    pub last_error: Option<String>,
    /// Set once the loop has exited after cancellation.
    pub stopped: bool,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: LoopState::Sleeping,
            cycles: 0,
            last_scan_at: None,
            last_report: None,
            last_error: None,
            stopped: false,
        }
    }
}

/// Runs the debt scan once per interval until cancelled.
pub struct SchedulerEngine<F> {
    scanner: Arc<DebtScanner<F>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl<F: StoreFactory> SchedulerEngine<F> {
    /// Engine with the standard daily interval.
    pub fn new(factory: F, clock: Arc<dyn Clock>) -> Self {
        let (status_tx, _) = watch::channel(SchedulerStatus::default());
        Self {
            scanner: Arc::new(DebtScanner::new(factory)),
            clock,
            interval: Duration::from_secs(DEBT_SCAN_INTERVAL_SECS),
            status_tx,
        }
    }

    /// Override the sleep between scans.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    /// Run a single scan on the blocking pool, outside the loop.
    ///
    /// rusqlite is synchronous, so the scan must not run on an async worker.
    pub async fn scan_once(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        let scanner = Arc::clone(&self.scanner);
        let cancel = cancel.clone();
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || scanner.scan(now, &cancel))
            .await
            .map_err(|e| SchedulerError::Join(e.to_string()))?
    }

    /// Main loop. Scans immediately, then once per interval, until `cancel`
    /// fires. Scan errors are logged and never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "debt scheduler started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.status_tx.send_modify(|s| s.state = LoopState::Scanning);
            let scanned_at = self.clock.now().to_rfc3339();
            let outcome = self.scan_once(&cancel).await;

            self.status_tx.send_modify(|s| {
                s.cycles += 1;
                s.last_scan_at = Some(scanned_at.clone());
            });
            let cycle = self.status_tx.borrow().cycles;
            match outcome {
                Ok(report) => {
                    info!(
                        cycle,
                        threshold = %report.threshold,
                        candidates = report.candidates,
                        notified = report.notified,
                        skipped_paid = report.skipped_paid,
                        skipped_unclaimed = report.skipped_unclaimed,
                        skipped_duplicate = report.skipped_duplicate,
                        interrupted = report.interrupted,
                        "debt scan complete"
                    );
                    self.status_tx.send_modify(|s| {
                        s.last_report = Some(report);
                        s.last_error = None;
                    });
                }
                Err(e) => {
                    error!(cycle, error = ?e, "debt scan failed: {e}");
                    self.status_tx.send_modify(|s| s.last_error = Some(e.to_string()));
                }
            }

            self.status_tx.send_modify(|s| s.state = LoopState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.status_tx.send_modify(|s| s.stopped = true);
        info!("debt scheduler stopped");
    }
}
