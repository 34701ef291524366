//! BufferActor - Batches points and writes them to the backend
//!
//! ## Architecture
//!
//! Producers hold a [`PointBuffer`] handle. `add_point` pushes onto an
//! unbounded channel and returns immediately; it never waits for the actor,
//! let alone for the backend.
//!
//! The actor owns the batch being accumulated. On a flush trigger the batch is
//! moved into a spawned write task and a fresh batch takes its place, so a slow
//! write never stalls accumulation of new points.
//!
//! ## Batching Strategy
//!
//! - **Time trigger**: Flush every 2 seconds (configurable)
//! - **Size trigger**: Flush once 5000 points are pending (configurable)
//!
//! ## Delivery
//!
//! At most once. A write that fails or exceeds the write timeout is logged and
//! its batch is dropped; nothing is retried.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{BufferCommand, BufferStats};
use crate::config::BufferConfig;
use crate::storage::{MetricPoint, StorageBackend, StorageError, StorageResult};

/// Anything that accepts finished points
///
/// Implemented by [`PointBuffer`]. Submitting must not block.
pub trait PointSink: Send + Sync {
    fn add_point(&self, point: MetricPoint);
}

/// Counters shared between the actor and its write tasks
#[derive(Debug, Default)]
struct WriteCounters {
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    points_written: AtomicU64,
    points_dropped: AtomicU64,
    in_flight: AtomicU64,
}

/// Outcome of one write task, reported back to the actor
type WriteDone = (u64, StorageResult<usize>);

/// Held by a write task for its whole lifetime
///
/// Dropping it, on return or on panic, releases the in-flight slot and
/// reports the outcome to the actor.
struct WriteGuard {
    id: u64,
    counters: Arc<WriteCounters>,
    done_tx: mpsc::UnboundedSender<WriteDone>,
    result: Option<StorageResult<usize>>,
}

impl WriteGuard {
    fn new(
        id: u64,
        counters: Arc<WriteCounters>,
        done_tx: mpsc::UnboundedSender<WriteDone>,
    ) -> Self {
        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            counters,
            done_tx,
            result: None,
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);

        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(StorageError::BackendError("write task panicked".to_string())));
        let _ = self.done_tx.send((self.id, result));
    }
}

/// A Flush command waiting for the writes it covers
struct FlushWaiter {
    waiting: HashSet<u64>,
    written: usize,
    error: Option<StorageError>,
    respond_to: oneshot::Sender<StorageResult<usize>>,
}

/// Point buffer actor
pub struct BufferActor {
    backend: Arc<dyn StorageBackend>,

    /// Batch being accumulated
    batch: Vec<MetricPoint>,

    /// Incoming points
    point_rx: mpsc::UnboundedReceiver<MetricPoint>,

    /// Command receiver
    command_rx: mpsc::Receiver<BufferCommand>,

    /// Write tasks that have not been reaped yet
    writes: JoinSet<()>,

    /// Ids of writes that have not reported back
    unfinished: HashSet<u64>,
    next_write_id: u64,
    done_tx: mpsc::UnboundedSender<WriteDone>,
    done_rx: mpsc::UnboundedReceiver<WriteDone>,
    flush_waiters: Vec<FlushWaiter>,

    flush_interval: Duration,
    max_batch_size: usize,
    write_timeout: Duration,

    points_received: u64,
    counters: Arc<WriteCounters>,
}

impl BufferActor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        config: &BufferConfig,
        point_rx: mpsc::UnboundedReceiver<MetricPoint>,
        command_rx: mpsc::Receiver<BufferCommand>,
    ) -> Self {
        let max_batch_size = config.max_batch_size.max(1);
        debug!(
            "creating point buffer for {} backend (interval {:?}, max batch {max_batch_size})",
            backend.name(),
            config.flush_interval()
        );

        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            backend,
            batch: Vec::new(),
            point_rx,
            command_rx,
            writes: JoinSet::new(),
            unfinished: HashSet::new(),
            next_write_id: 0,
            done_tx,
            done_rx,
            flush_waiters: Vec::new(),
            flush_interval: config.flush_interval(),
            max_batch_size,
            write_timeout: config.write_timeout(),
            points_received: 0,
            counters: Arc::new(WriteCounters::default()),
        }
    }

    /// Run the actor's main loop
    ///
    /// Exits on a Shutdown command or once every handle is dropped. Either
    /// way the pending batch is written and in-flight writes are awaited.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting point buffer");

        // First tick one interval from now, not immediately
        let mut flush_interval =
            time::interval_at(time::Instant::now() + self.flush_interval, self.flush_interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                // Receive points
                point = self.point_rx.recv() => {
                    match point {
                        Some(point) => self.push(point),
                        None => {
                            debug!("point channel closed, shutting down");
                            break;
                        }
                    }
                }

                // Time-based flush trigger
                _ = flush_interval.tick() => {
                    if !self.batch.is_empty() {
                        trace!("time-based flush triggered ({} points)", self.batch.len());
                        self.flush_batch();
                    }
                }

                // Write outcomes
                Some((id, result)) = self.done_rx.recv() => {
                    self.write_finished(id, result);
                }

                // Reap finished writes
                Some(joined) = self.writes.join_next(), if !self.writes.is_empty() => {
                    if let Err(e) = joined {
                        error!("write task failed: {e}");
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        BufferCommand::Flush { respond_to } => {
                            debug!("manual flush requested");
                            self.drain_pending();
                            if !self.batch.is_empty() {
                                self.flush_batch();
                            }
                            self.wait_for_writes(respond_to);
                        }

                        BufferCommand::GetStats { respond_to } => {
                            self.drain_pending();
                            let _ = respond_to.send(self.stats());
                        }

                        BufferCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }
                    }
                }
            }
        }

        // Final flush before shutdown
        self.drain_pending();
        if !self.batch.is_empty() {
            debug!("final flush before shutdown ({} points)", self.batch.len());
            self.flush_batch();
        }

        while let Some(joined) = self.writes.join_next().await {
            if let Err(e) = joined {
                error!("write task failed: {e}");
            }
        }

        // Every task has dropped its guard, so every outcome is queued
        while let Ok((id, result)) = self.done_rx.try_recv() {
            self.write_finished(id, result);
        }

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }

        debug!("point buffer stopped");
    }

    fn push(&mut self, point: MetricPoint) {
        self.points_received += 1;
        self.batch.push(point);

        // Size-based flush trigger
        if self.batch.len() >= self.max_batch_size {
            trace!("size-based flush triggered ({} points)", self.batch.len());
            self.flush_batch();
        }
    }

    /// Move points already queued on the channel into the batch
    ///
    /// Commands and points travel on separate channels; draining first makes
    /// a command observe every point submitted before it.
    fn drain_pending(&mut self) {
        while let Ok(point) = self.point_rx.try_recv() {
            self.push(point);
        }
    }

    /// Hand the current batch to a write task and start a new one
    fn flush_batch(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        debug!("writing {} points to {}", batch.len(), self.backend.name());

        let id = self.next_write_id;
        self.next_write_id += 1;
        self.unfinished.insert(id);

        let backend = self.backend.clone();
        let timeout = self.write_timeout;
        let mut guard = WriteGuard::new(id, self.counters.clone(), self.done_tx.clone());

        self.writes.spawn(async move {
            let result = write_batch(backend.as_ref(), batch, timeout, &guard.counters).await;
            guard.result = Some(result);
        });
    }

    /// Answer once every write started so far has finished
    ///
    /// Reports the points written by those writes, or the first failure.
    fn wait_for_writes(&mut self, respond_to: oneshot::Sender<StorageResult<usize>>) {
        if self.unfinished.is_empty() {
            let _ = respond_to.send(Ok(0));
            return;
        }

        trace!("flush waiting for {} writes", self.unfinished.len());
        self.flush_waiters.push(FlushWaiter {
            waiting: self.unfinished.clone(),
            written: 0,
            error: None,
            respond_to,
        });
    }

    fn write_finished(&mut self, id: u64, result: StorageResult<usize>) {
        self.unfinished.remove(&id);

        let mut i = 0;
        while i < self.flush_waiters.len() {
            let waiter = &mut self.flush_waiters[i];
            if waiter.waiting.remove(&id) {
                match &result {
                    Ok(written) => waiter.written += written,
                    Err(e) => {
                        waiter.error.get_or_insert_with(|| e.clone());
                    }
                }
            }

            if waiter.waiting.is_empty() {
                let waiter = self.flush_waiters.swap_remove(i);
                let _ = waiter.respond_to.send(match waiter.error {
                    Some(e) => Err(e),
                    None => Ok(waiter.written),
                });
            } else {
                i += 1;
            }
        }
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            points_received: self.points_received,
            pending: self.batch.len(),
            batches_written: self.counters.batches_written.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            points_written: self.counters.points_written.load(Ordering::Relaxed),
            points_dropped: self.counters.points_dropped.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Write one batch with a timeout, recording the outcome
async fn write_batch(
    backend: &dyn StorageBackend,
    batch: Vec<MetricPoint>,
    timeout: Duration,
    counters: &WriteCounters,
) -> StorageResult<usize> {
    let size = batch.len();

    let result = match time::timeout(timeout, backend.write_batch(batch)).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(timeout)),
    };

    match &result {
        Ok(()) => {
            counters.batches_written.fetch_add(1, Ordering::Relaxed);
            counters.points_written.fetch_add(size as u64, Ordering::Relaxed);
            trace!("write complete ({size} points)");
        }
        Err(e) => {
            counters.batches_failed.fetch_add(1, Ordering::Relaxed);
            counters.points_dropped.fetch_add(size as u64, Ordering::Relaxed);
            error!("could not save {size} points: {e}");
        }
    }

    result.map(|()| size)
}

/// Handle for submitting points to the BufferActor
///
/// Cheap to clone; every clone feeds the same actor.
#[derive(Clone)]
pub struct PointBuffer {
    point_tx: mpsc::UnboundedSender<MetricPoint>,
    sender: mpsc::Sender<BufferCommand>,
}

impl PointBuffer {
    /// Spawn a new buffer actor writing to `backend`
    pub fn spawn(backend: Arc<dyn StorageBackend>, config: &BufferConfig) -> Self {
        let (point_tx, point_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = BufferActor::new(backend, config, point_rx, cmd_rx);

        tokio::spawn(actor.run());

        Self {
            point_tx,
            sender: cmd_tx,
        }
    }

    /// Queue a point for the next batch
    ///
    /// Returns immediately. Acceptance does not imply the point will be
    /// stored: the batch it lands in may still fail to write.
    pub fn add_point(&self, point: MetricPoint) {
        if self.point_tx.send(point).is_err() {
            warn!("point buffer stopped, dropping point");
        }
    }

    /// Write pending points now and wait for every write in progress
    ///
    /// Returns the number of points those writes stored, or the first write
    /// error. Size- and time-triggered batches still in flight are included.
    pub async fn flush(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BufferCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        let written = rx.await.context("failed to receive response")??;
        Ok(written)
    }

    /// Get buffer statistics
    pub async fn get_stats(&self) -> Option<BufferStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BufferCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Write pending points, wait for every in-flight write, then stop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(BufferCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl PointSink for PointBuffer {
    fn add_point(&self, point: MetricPoint) {
        PointBuffer::add_point(self, point);
    }
}
