//! Background flush worker
//!
//! Writes reach the backend through a single tokio task fed by a one-slot
//! `watch` channel. Publishing a snapshot replaces any snapshot the worker has
//! not picked up yet, and the worker writes one snapshot at a time, so the
//! durable copy only ever moves forward: a slow write can delay a newer state
//! but never overwrite it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{EntryMap, StoreBackend};
use crate::error::StoreError;

/// A copy of the entry map taken when a flush was requested
#[derive(Debug, Clone)]
struct Snapshot {
    generation: u64,
    entries: Arc<EntryMap>,
}

/// Result of the most recent completed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing has been written yet
    Pending,
    /// The snapshot reached the durable backend
    Succeeded,
    /// The write failed; the previous durable copy is untouched
    Failed(String),
}

/// Completion notice published after every write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Generation of the snapshot that was written (0 before any write)
    pub generation: u64,
    /// How the write ended
    pub outcome: FlushOutcome,
    /// When the write attempt finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlushReport {
    fn initial() -> Self {
        Self {
            generation: 0,
            outcome: FlushOutcome::Pending,
            completed_at: None,
        }
    }

    /// Whether this report describes a successful write
    pub fn is_success(&self) -> bool {
        self.outcome == FlushOutcome::Succeeded
    }
}

/// Handle owned by the store for scheduling writes
#[derive(Debug)]
pub(crate) struct Flusher {
    snapshot_tx: watch::Sender<Option<Snapshot>>,
    report_rx: watch::Receiver<FlushReport>,
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
    next_generation: u64,
}

impl Flusher {
    /// Spawns the worker on the current tokio runtime
    pub(crate) fn spawn(backend: Arc<dyn StoreBackend>) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (report_tx, report_rx) = watch::channel(FlushReport::initial());
        let stopped = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(backend, snapshot_rx, report_tx, stopped.clone()));

        Self {
            snapshot_tx,
            report_rx,
            stopped,
            task,
            next_generation: 1,
        }
    }

    /// Publishes a snapshot of `entries` and returns its generation
    ///
    /// Never blocks; the write happens on the worker task.
    pub(crate) fn schedule(&mut self, entries: &EntryMap) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;

        self.snapshot_tx.send_replace(Some(Snapshot {
            generation,
            entries: Arc::new(entries.clone()),
        }));

        generation
    }

    /// Waits until a write covering `generation` has completed
    pub(crate) async fn wait_for(&self, generation: u64) -> Result<(), StoreError> {
        let mut report_rx = self.report_rx.clone();

        loop {
            let outcome = {
                let report = report_rx.borrow_and_update();
                (report.generation >= generation).then(|| report.outcome.clone())
            };

            match outcome {
                Some(FlushOutcome::Succeeded) => return Ok(()),
                Some(FlushOutcome::Failed(reason)) => return Err(StoreError::FlushFailure(reason)),
                Some(FlushOutcome::Pending) | None => {}
            }

            if report_rx.changed().await.is_err() {
                return Err(StoreError::Destroyed);
            }
        }
    }

    /// Receiver for flush completion notices
    pub(crate) fn subscribe(&self) -> watch::Receiver<FlushReport> {
        self.report_rx.clone()
    }

    /// Latest flush report
    pub(crate) fn last_report(&self) -> FlushReport {
        self.report_rx.borrow().clone()
    }

    /// Stops the worker without writing snapshots it has not started on
    ///
    /// A write already in progress is allowed to finish so the durable
    /// target is never left half-replaced.
    pub(crate) async fn shutdown(self) {
        self.stopped.store(true, Ordering::SeqCst);
        drop(self.snapshot_tx);

        if let Err(e) = self.task.await {
            error!(error = %e, "flush worker terminated abnormally");
        }
    }
}

async fn run(
    backend: Arc<dyn StoreBackend>,
    mut snapshot_rx: watch::Receiver<Option<Snapshot>>,
    report_tx: watch::Sender<FlushReport>,
    stopped: Arc<AtomicBool>,
) {
    while snapshot_rx.changed().await.is_ok() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let snapshot = snapshot_rx.borrow_and_update().clone();
        let Some(snapshot) = snapshot else {
            continue;
        };

        let outcome = match backend.flush(&snapshot.entries).await {
            Ok(()) => {
                debug!(
                    backend = %backend.describe(),
                    generation = snapshot.generation,
                    entries = snapshot.entries.len(),
                    "store flushed"
                );
                FlushOutcome::Succeeded
            }
            Err(e) => {
                error!(
                    backend = %backend.describe(),
                    generation = snapshot.generation,
                    error = %e,
                    "store flush failed"
                );
                FlushOutcome::Failed(e.to_string())
            }
        };

        report_tx.send_replace(FlushReport {
            generation: snapshot.generation,
            outcome,
            completed_at: Some(Utc::now()),
        });
    }

    debug!(backend = %backend.describe(), "flush worker stopped");
}
