//! POST / - Callback API events

use axum::{body::Bytes, extract::State};
use tracing::{instrument, trace};

use super::error::WebhookError;
use super::types::{CONFIRMATION, CallbackEvent, MESSAGE_REPLY, MessageObject};
use super::WebhookState;

/// Validate a callback and dispatch it to the event callbacks
///
/// Responds with the confirmation string to `confirmation` events and with
/// `ok` to everything else that passes validation, including event types
/// nobody listens for.
#[instrument(skip_all)]
pub async fn handle_callback(
    State(state): State<WebhookState>,
    body: Bytes,
) -> Result<String, WebhookError> {
    let event: CallbackEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::MalformedEvent(e.to_string()))?;

    if !state.secret.is_empty() && event.secret.as_deref() != Some(&*state.secret) {
        return Err(WebhookError::InvalidSecret);
    }

    trace!("received {} event", event.event_type);

    match event.event_type.as_str() {
        CONFIRMATION => Ok(state.confirmation.to_string()),
        MESSAGE_REPLY => {
            let message: MessageObject = serde_json::from_value(event.object)
                .map_err(|e| WebhookError::MalformedEvent(e.to_string()))?;

            state.events.on_message_reply(message.from_id);
            Ok("ok".to_string())
        }
        _ => Ok("ok".to_string()),
    }
}
