//! Asynchronous batched deletion.
//!
//! Deletion requests go into a bounded intake queue and return immediately.
//! A single background worker collects them and applies the whole pending
//! batch with one [`StorageBackend::tag_deleted`] call per tick. A batch that
//! fails is logged and dropped (at-most-once). On cancellation the worker
//! closes the intake, takes everything still buffered and flushes once more
//! before it stops.

use crate::settings::DeletionSettings;
use crate::{RegistryError, Result};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use urlshort_core::{Deletion, StorageBackend};

/// Shortest tick period; zero would make the ticker panic.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting requests and flushing on every tick.
    Running,
    /// Intake closed, final flush in progress.
    Draining,
    Stopped,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Handle to the background deletion worker.
///
/// Dropping the handle closes the intake, which also makes the worker drain
/// and stop.
#[derive(Debug)]
pub struct DeletionPipeline {
    intake: mpsc::Sender<Deletion>,
    state: watch::Receiver<PipelineState>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    rejected: AtomicU64,
    drain_timeout: Duration,
}

impl DeletionPipeline {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// Cancelling `cancel` starts the drain, so a process-wide shutdown
    /// token can be passed in directly.
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        settings: DeletionSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (intake, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let flush_interval = settings.flush_interval.max(MIN_FLUSH_INTERVAL);
        let (state_tx, state) = watch::channel(PipelineState::Running);

        let batcher = Batcher {
            backend,
            pending: Vec::new(),
            flush_timeout: settings.flush_timeout,
        };
        let worker = tokio::spawn(run_worker(
            batcher,
            receiver,
            state_tx,
            flush_interval,
            cancel.clone(),
        ));

        debug!(
            queue_capacity = settings.queue_capacity,
            flush_interval = ?flush_interval,
            "deletion pipeline started"
        );

        Self {
            intake,
            state,
            cancel,
            worker: Mutex::new(Some(worker)),
            rejected: AtomicU64::new(0),
            drain_timeout: settings.drain_timeout,
        }
    }

    /// Queues a deletion without waiting.
    ///
    /// Returns false when the request was rejected because the queue is full
    /// or the pipeline is no longer running.
    pub fn enqueue(&self, deletion: Deletion) -> bool {
        let (deletion, reason) = match self.intake.try_send(deletion) {
            Ok(()) => return true,
            Err(TrySendError::Full(deletion)) => (deletion, "queue full"),
            Err(TrySendError::Closed(deletion)) => (deletion, "pipeline stopped"),
        };

        let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            id = %deletion.link_id,
            owner = %deletion.owner_id,
            reason,
            rejected,
            "deletion request rejected"
        );
        false
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Number of requests rejected by [`enqueue`](Self::enqueue) so far.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Cancels the worker and waits, bounded by the drain timeout, for the
    /// final flush. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();

        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return Ok(());
        };

        match time::timeout(self.drain_timeout, worker).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(RegistryError::StorageUnavailable(format!(
                "deletion worker failed: {err}"
            ))),
            Err(_) => {
                error!(timeout = ?self.drain_timeout, "deletion drain did not finish in time");
                Err(RegistryError::StorageUnavailable(format!(
                    "deletion drain exceeded {:?}",
                    self.drain_timeout
                )))
            }
        }
    }
}

struct Batcher {
    backend: Arc<dyn StorageBackend>,
    pending: Vec<Deletion>,
    flush_timeout: Duration,
}

impl Batcher {
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();

        match time::timeout(self.flush_timeout, self.backend.tag_deleted(&batch)).await {
            Ok(Ok(())) => debug!(count, "deletion batch flushed"),
            Ok(Err(err)) => error!(count, error = %err, "deletion batch failed, dropping it"),
            Err(_) => error!(
                count,
                timeout = ?self.flush_timeout,
                "deletion batch timed out, dropping it"
            ),
        }
    }
}

async fn run_worker(
    mut batcher: Batcher,
    mut intake: mpsc::Receiver<Deletion>,
    state: watch::Sender<PipelineState>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("deletion pipeline cancelled");
                break;
            }
            _ = ticker.tick() => batcher.flush().await,
            received = intake.recv() => match received {
                Some(deletion) => {
                    trace!(id = %deletion.link_id, owner = %deletion.owner_id, "deletion queued");
                    batcher.pending.push(deletion);
                }
                None => {
                    debug!("deletion intake closed");
                    break;
                }
            },
        }
    }

    state.send_replace(PipelineState::Draining);
    intake.close();
    while let Some(deletion) = intake.recv().await {
        batcher.pending.push(deletion);
    }
    info!(pending = batcher.pending.len(), "draining deletion pipeline");

    batcher.flush().await;
    state.send_replace(PipelineState::Stopped);
    info!("deletion pipeline stopped");
}
