//! UnreadProbe - Polls the unread conversation count
//!
//! ## Message Flow
//!
//! ```text
//! Round tick → messages.getConversations → parse unread_count → unread point → PointBuffer
//! ```
//!
//! A failed request or an unparseable response skips the round: nothing is
//! emitted and nothing is retried before the next round.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use super::buffer::PointSink;
use super::scheduler::RoundTask;
use crate::storage::{FieldValue, MetricPoint};
use crate::upstream::UpstreamApi;

/// Measurement written for the unread count
pub const UNREAD_MEASUREMENT: &str = "unread";

const CONVERSATIONS_METHOD: &str = "messages.getConversations";

#[derive(Debug, Deserialize)]
struct ConversationsEnvelope {
    response: ConversationsResponse,
}

#[derive(Debug, Deserialize)]
struct ConversationsResponse {
    /// Omitted by the API when nothing is unread
    #[serde(default)]
    unread_count: i64,
}

/// Round task reporting the community's unread conversations
pub struct UnreadProbe {
    api: Arc<dyn UpstreamApi>,
    sink: Arc<dyn PointSink>,
    group_id: String,
}

impl UnreadProbe {
    pub fn new(api: Arc<dyn UpstreamApi>, sink: Arc<dyn PointSink>, group_id: String) -> Self {
        Self {
            api,
            sink,
            group_id,
        }
    }

    /// Query the unread count and submit it as a point
    #[instrument(skip(self), fields(group = %self.group_id))]
    pub async fn gather(&self) -> Result<i64> {
        let value = self
            .api
            .query(
                CONVERSATIONS_METHOD,
                &[("count", "0"), ("group_id", self.group_id.as_str())],
            )
            .await
            .context("could not load unread messages")?;

        let envelope: ConversationsEnvelope =
            serde_json::from_value(value).context("failed to parse conversations response")?;
        let unread = envelope.response.unread_count;

        trace!("unread conversations: {unread}");

        let fields = BTreeMap::from([(UNREAD_MEASUREMENT.to_string(), FieldValue::Integer(unread))]);
        let point = MetricPoint::new(UNREAD_MEASUREMENT, BTreeMap::new(), fields, Utc::now())
            .context("could not create point")?;

        self.sink.add_point(point);
        Ok(unread)
    }
}

#[async_trait]
impl RoundTask for UnreadProbe {
    async fn run_round(&self) -> Result<()> {
        let unread = self.gather().await?;
        debug!("submitted unread count {unread}");
        Ok(())
    }
}
