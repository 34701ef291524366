//! Message types for actor communication
//!
//! This module defines the command types sent to actors through their handles.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Points**: Data points travel on their own unbounded channel so that
//!    producers never wait on an actor
//! 3. **Replies**: oneshot channels for synchronous queries

use tokio::sync::oneshot;

use crate::storage::StorageResult;

/// Commands that can be sent to a RoundScheduler
#[derive(Debug)]
pub enum RoundCommand {
    /// Run the task immediately, outside the round cadence
    ///
    /// Used for testing and manual refresh operations. Does not shift the
    /// next boundary.
    FireNow {
        /// Channel to send the task result back
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Stop the scheduler
    ///
    /// Rounds already running finish on their own.
    Shutdown,
}

/// Commands that can be sent to the BufferActor
#[derive(Debug)]
pub enum BufferCommand {
    /// Write the pending batch now and report once every write started so
    /// far has finished
    ///
    /// Responds `Ok(0)` right away if nothing is pending or in flight.
    Flush {
        respond_to: oneshot::Sender<StorageResult<usize>>,
    },

    /// Get buffer statistics
    GetStats {
        respond_to: oneshot::Sender<BufferStats>,
    },

    /// Write what is pending, wait for it, then stop
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Point buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Points accepted by the actor since start
    pub points_received: u64,

    /// Points in the batch currently being accumulated
    pub pending: usize,

    /// Batches handed to the backend successfully
    pub batches_written: u64,

    /// Batches dropped after a failed or timed-out write
    pub batches_failed: u64,

    /// Points in successful batches
    pub points_written: u64,

    /// Points in failed batches
    pub points_dropped: u64,

    /// Writes started but not yet finished
    pub in_flight: u64,
}
