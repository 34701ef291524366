//! Actor-based collection pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Callback API ──► Aggregator::record        VK API
//!                        │                        ▲
//!            RoundScheduler (hourly)   RoundScheduler (5 min)
//!                        │                        │
//!                 Aggregator::flush         UnreadProbe
//!                        │                        │
//!                        └──────────┬─────────────┘
//!                                   ▼
//!                      PointBuffer (unbounded mpsc)
//!                                   │
//!                              BufferActor ──spawn──► write task ──► StorageBackend
//! ```
//!
//! ## Actor Types
//!
//! - **RoundScheduler**: Fires a task on wall-clock round boundaries
//! - **BufferActor**: Batches points and writes them asynchronously
//! - **UnreadProbe**: Round task polling the unread conversation count
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Points**: Producers submit points on an unbounded channel, never waiting
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod buffer;
pub mod messages;
pub mod probe;
pub mod scheduler;
