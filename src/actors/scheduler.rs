//! RoundScheduler - Fires a task on wall-clock round boundaries
//!
//! A round boundary is an instant that is an exact multiple of the
//! granularity counted from the Unix epoch (UTC). With a granularity of one
//! hour the task fires at 15:00:00, 16:00:00, ... regardless of when the
//! process started.
//!
//! ## Message Flow
//!
//! ```text
//! sleep until boundary → spawn round task → compute next boundary → sleep ...
//!     ↑
//!     └─── Commands (FireNow, Shutdown)
//! ```
//!
//! The next boundary is recomputed from the wall clock after every round, so
//! the cadence stays aligned even if the monotonic clock and the wall clock
//! drift apart. A round never fires twice for the same boundary.
//!
//! Every round runs in its own tokio task. A slow, failing or panicking round
//! cannot delay or stop the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace};

use super::messages::RoundCommand;

/// Work executed once per round
#[async_trait]
pub trait RoundTask: Send + Sync + 'static {
    /// Run one round
    ///
    /// Errors are logged by the scheduler and otherwise ignored; the next
    /// round runs as usual.
    async fn run_round(&self) -> Result<()>;
}

/// Smallest epoch-aligned multiple of `granularity` strictly after `now`
///
/// When `now` sits exactly on a boundary the following boundary is returned,
/// never `now` itself.
pub fn next_boundary(now: DateTime<Utc>, granularity: Duration) -> Result<DateTime<Utc>> {
    if granularity.is_zero() {
        anyhow::bail!("round granularity must be greater than zero");
    }

    let step = TimeDelta::from_std(granularity).context("round granularity out of range")?;
    let floor = now
        .duration_trunc(step)
        .context("cannot align timestamp to round granularity")?;

    Ok(floor + step)
}

/// Time left until `boundary`, zero if it already passed
fn delay_until(now: DateTime<Utc>, boundary: DateTime<Utc>) -> Duration {
    (boundary - now).to_std().unwrap_or_default()
}

/// Actor that fires a task on every round boundary
pub struct RoundScheduler {
    /// Name for logging
    name: String,

    granularity: Duration,

    /// `granularity` as a chrono delta, validated at spawn
    step: TimeDelta,

    task: Arc<dyn RoundTask>,

    command_rx: mpsc::Receiver<RoundCommand>,

    /// Rounds started (boundary and FireNow)
    rounds: Arc<AtomicU64>,
}

impl RoundScheduler {
    fn new(
        name: String,
        granularity: Duration,
        step: TimeDelta,
        task: Arc<dyn RoundTask>,
        command_rx: mpsc::Receiver<RoundCommand>,
        rounds: Arc<AtomicU64>,
    ) -> Self {
        Self {
            name,
            granularity,
            step,
            task,
            command_rx,
            rounds,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs for the lifetime of the process unless a Shutdown command is
    /// received. Dropping every handle does not stop it.
    #[instrument(skip(self), fields(scheduler = %self.name))]
    pub async fn run(mut self) {
        let now = Utc::now();
        let mut boundary = match next_boundary(now, self.granularity) {
            Ok(boundary) => boundary,
            Err(e) => {
                error!("cannot schedule rounds: {e:#}");
                return;
            }
        };

        info!(
            "first round will be after {:?} (at {boundary})",
            delay_until(now, boundary)
        );

        loop {
            let sleep = tokio::time::sleep(delay_until(Utc::now(), boundary));
            tokio::pin!(sleep);

            tokio::select! {
                _ = &mut sleep => {
                    trace!("round boundary {boundary} reached");
                    self.spawn_round(None);
                    boundary = self.following_boundary(boundary);
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RoundCommand::FireNow { respond_to } => {
                            debug!("received FireNow command");
                            self.spawn_round(Some(respond_to));
                        }

                        RoundCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("round scheduler stopped");
    }

    /// Next boundary after a round, never earlier than one step past `fired`
    fn following_boundary(&self, fired: DateTime<Utc>) -> DateTime<Utc> {
        let minimum = fired + self.step;

        match next_boundary(Utc::now(), self.granularity) {
            Ok(next) if next > minimum => {
                debug!("skipped rounds, resuming at {next}");
                next
            }
            _ => minimum,
        }
    }

    /// Run the task in its own tokio task
    ///
    /// Errors and panics are logged here so they never reach the loop.
    fn spawn_round(&self, respond_to: Option<oneshot::Sender<Result<()>>>) {
        self.rounds.fetch_add(1, Ordering::Relaxed);

        let task = self.task.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            let result = match tokio::spawn(async move { task.run_round().await }).await {
                Ok(result) => result,
                Err(join_err) => Err(anyhow::anyhow!("round panicked: {join_err}")),
            };

            match &result {
                Ok(()) => trace!("[{name}] round complete"),
                Err(e) => error!("[{name}] round failed: {e:#}"),
            }

            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(result);
            }
        });
    }
}

/// Handle for controlling a RoundScheduler
///
/// This handle can be cloned and shared across tasks.
#[derive(Clone)]
pub struct RoundHandle {
    sender: mpsc::Sender<RoundCommand>,

    rounds: Arc<AtomicU64>,

    /// Scheduler name
    pub name: String,
}

impl RoundHandle {
    /// Spawn a new scheduler
    ///
    /// Fails if no boundary can be computed for `granularity` (zero or out
    /// of range).
    pub fn spawn(
        name: impl Into<String>,
        granularity: Duration,
        task: Arc<dyn RoundTask>,
    ) -> Result<Self> {
        let name = name.into();
        next_boundary(Utc::now(), granularity)
            .with_context(|| format!("invalid granularity for scheduler {name}"))?;
        let step = TimeDelta::from_std(granularity)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let rounds = Arc::new(AtomicU64::new(0));

        let actor = RoundScheduler::new(
            name.clone(),
            granularity,
            step,
            task,
            cmd_rx,
            rounds.clone(),
        );

        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            rounds,
            name,
        })
    }

    /// Run the task now and wait for its result
    pub async fn fire_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoundCommand::FireNow { respond_to: tx })
            .await
            .context("failed to send FireNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Number of rounds started so far
    pub fn rounds_fired(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Stop the scheduler
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RoundCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
