//! Storage backends for point persistence
//!
//! This module provides a trait-based abstraction for writing batches of
//! points to a time-series backend.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: Writes are async and run off the ingestion path
//! - **Batch-oriented**: One request per batch, never one per point
//!
//! ## Backends
//!
//! - **InfluxDB v2** (default): HTTP write API with line protocol
//! - **In-Memory** (fallback): No persistence, for dry runs and tests
//!
//! ## Usage
//!
//! ```no_run
//! use group_graphs::config::InfluxConfig;
//! use group_graphs::storage::{StorageBackend, influx::InfluxBackend};
//!
//! # fn example(config: InfluxConfig) -> anyhow::Result<()> {
//! let backend = InfluxBackend::new(config)?;
//! // Hand to PointBuffer::spawn
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod influx;
pub mod memory;
pub mod point;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use point::{FieldValue, MetricPoint, PointError, Precision};
