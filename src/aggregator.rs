//! Per-actor message counter
//!
//! Counts events per actor id for the current aggregation window. Once per
//! round the scheduler calls [`Aggregator::flush`], which swaps the window
//! for an empty one under the same lock `record` uses and emits one point per
//! actor.
//!
//! An increment racing with a flush lands either in the window being flushed
//! or in the next one, never in both and never in neither.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::MessageEvents;
use crate::actors::buffer::PointSink;
use crate::actors::scheduler::RoundTask;
use crate::storage::{FieldValue, MetricPoint, PointError};

/// Actor id under which messages are counted
pub type AggregateKey = i64;

/// Measurement written for message counts
pub const MESSAGES_MEASUREMENT: &str = "messages";

/// Counts message replies per author between rounds
///
/// Shared via `Arc` between the callback endpoint, which records, and the
/// hourly scheduler, which flushes.
pub struct Aggregator {
    /// Current aggregation window
    window: Mutex<HashMap<AggregateKey, u64>>,

    sink: Arc<dyn PointSink>,
}

impl Aggregator {
    pub fn new(sink: Arc<dyn PointSink>) -> Self {
        Self {
            window: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Count one event for `key` in the current window
    pub fn record(&self, key: AggregateKey) {
        *self.window.lock().entry(key).or_insert(0) += 1;
    }

    /// Swap out the current window and emit its counts
    ///
    /// Returns the number of points submitted. An empty window submits
    /// nothing.
    #[instrument(skip(self))]
    pub fn flush(&self) -> usize {
        let window = self.take_window();
        if window.is_empty() {
            debug!("nothing to flush");
            return 0;
        }

        debug!("flushing counts for {} actors", window.len());

        let now = Utc::now();
        let mut submitted = 0;
        for (key, count) in window {
            match message_point(key, count, now) {
                Ok(point) => {
                    self.sink.add_point(point);
                    submitted += 1;
                }
                Err(e) => warn!("could not create point for {key}: {e}"),
            }
        }

        submitted
    }

    /// Actors with at least one event in the current window
    pub fn pending_keys(&self) -> usize {
        self.window.lock().len()
    }

    /// Events counted in the current window
    pub fn pending_total(&self) -> u64 {
        self.window.lock().values().sum()
    }

    fn take_window(&self) -> HashMap<AggregateKey, u64> {
        std::mem::take(&mut *self.window.lock())
    }
}

/// One `messages` point: tag `agent`, field `messages`
fn message_point(
    key: AggregateKey,
    count: u64,
    timestamp: DateTime<Utc>,
) -> Result<MetricPoint, PointError> {
    let count = i64::try_from(count)
        .map_err(|_| PointError::ValueOutOfRange(MESSAGES_MEASUREMENT.to_string()))?;

    let tags = BTreeMap::from([("agent".to_string(), key.to_string())]);
    let fields = BTreeMap::from([(MESSAGES_MEASUREMENT.to_string(), FieldValue::Integer(count))]);

    MetricPoint::new(MESSAGES_MEASUREMENT, tags, fields, timestamp)
}

impl MessageEvents for Aggregator {
    fn on_message_reply(&self, from_id: i64) {
        self.record(from_id);
    }
}

#[async_trait]
impl RoundTask for Aggregator {
    async fn run_round(&self) -> Result<()> {
        let submitted = self.flush();
        debug!("submitted {submitted} message points");
        Ok(())
    }
}
