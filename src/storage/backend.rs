//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that the point buffer
//! writes batches through.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::point::MetricPoint;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for metric backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: the point buffer shares one
/// backend between concurrently running write tasks.
///
/// ## Delivery
///
/// A batch is written at most once. Callers drop the batch when
/// `write_batch` fails, so implementations need not be idempotent.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write a batch of points
    ///
    /// This is the only write method. The point buffer guarantees the batch
    /// is non-empty.
    async fn write_batch(&self, points: Vec<MetricPoint>) -> StorageResult<()>;

    /// Check backend health
    ///
    /// Performs a lightweight request to verify the backend is reachable.
    /// Used at startup to warn early about a misconfigured backend.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
