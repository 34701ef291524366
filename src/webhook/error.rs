//! Callback endpoint error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Reasons a callback is rejected
#[derive(Debug)]
pub enum WebhookError {
    /// Body is not a valid callback event
    MalformedEvent(String),

    /// Secret missing or not matching the configured one
    InvalidSecret,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookError::MalformedEvent(reason) => {
                debug!("rejecting malformed callback: {reason}");
                (StatusCode::BAD_REQUEST, "Malformed event")
            }
            WebhookError::InvalidSecret => (StatusCode::FORBIDDEN, "Invalid secret"),
        };

        (status, message).into_response()
    }
}
