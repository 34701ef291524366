//! Callback API payloads

use serde::Deserialize;

/// Event type answered with the confirmation string
pub const CONFIRMATION: &str = "confirmation";

/// Event type sent for every outgoing community message
pub const MESSAGE_REPLY: &str = "message_reply";

/// Envelope of every callback
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub group_id: Option<i64>,

    #[serde(default)]
    pub secret: Option<String>,

    /// Event-specific payload, decoded once the type is known
    #[serde(default)]
    pub object: serde_json::Value,
}

/// Payload of `message_reply`
#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    /// Author of the reply (the community member who answered)
    pub from_id: i64,

    /// Conversation the reply was sent to
    #[serde(default)]
    pub peer_id: Option<i64>,
}
