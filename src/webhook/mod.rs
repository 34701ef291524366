//! Callback API endpoint
//!
//! Receives community events pushed by the platform and turns them into typed
//! [`MessageEvents`] callbacks.
//!
//! ## Endpoints
//!
//! - `POST /` - Callback API events
//!
//! ## Validation
//!
//! - Body must be a JSON callback envelope (400 otherwise)
//! - `secret` must match the configured secret when one is set (403 otherwise)
//! - `message_reply` objects must carry an integer `from_id` (400 otherwise)

pub mod error;
pub mod handler;
pub mod types;

pub use error::WebhookError;
pub use types::{CallbackEvent, MessageObject};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::MessageEvents;
use crate::config::VkConfig;

/// Callback endpoint configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// String returned for `confirmation` events
    pub confirmation: String,

    /// Expected `secret`; empty disables the check
    pub secret: String,
}

impl WebhookConfig {
    pub fn from_vk(bind_addr: SocketAddr, vk: &VkConfig) -> Self {
        Self {
            bind_addr,
            confirmation: vk.confirmation.clone(),
            secret: vk.secret.clone(),
        }
    }
}

/// State shared by the handlers
#[derive(Clone)]
pub struct WebhookState {
    pub confirmation: Arc<str>,
    pub secret: Arc<str>,
    pub events: Arc<dyn MessageEvents>,
}

/// Build the router without binding it
pub fn router(config: &WebhookConfig, events: Arc<dyn MessageEvents>) -> Router {
    let state = WebhookState {
        confirmation: config.confirmation.as_str().into(),
        secret: config.secret.as_str().into(),
        events,
    };

    Router::new()
        .route("/", post(handler::handle_callback))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the callback server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_webhook_server(
    config: WebhookConfig,
    events: Arc<dyn MessageEvents>,
) -> anyhow::Result<SocketAddr> {
    info!("starting callback server on {}", config.bind_addr);

    let app = router(&config, events);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("callback server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("callback server error: {}", e);
        }
    });

    Ok(addr)
}
