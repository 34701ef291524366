pub mod actors;
pub mod aggregator;
pub mod config;
pub mod storage;
pub mod upstream;
pub mod util;
#[cfg(feature = "webhook")]
pub mod webhook;

/// Typed callbacks for events delivered by the Callback API
///
/// Implementations are invoked from request handlers on arbitrary runtime
/// threads and must not block.
pub trait MessageEvents: Send + Sync {
    /// A community message was sent by `from_id`
    fn on_message_reply(&self, from_id: i64);
}
