//! In-memory storage backend (no persistence)
//!
//! This backend keeps every written batch in memory.
//! It's useful for:
//! - Dry runs without an InfluxDB instance (selected when no `influxdb`
//!   section is configured)
//! - Tests that need to inspect exactly what was written
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Batches are never evicted

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use super::point::MetricPoint;

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    /// Batches in write order
    batches: Mutex<Vec<Vec<MetricPoint>>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches written so far
    pub fn batches(&self) -> Vec<Vec<MetricPoint>> {
        self.batches.lock().clone()
    }

    /// All points written so far, flattened in write order
    pub fn points(&self) -> Vec<MetricPoint> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn total_points(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn write_batch(&self, points: Vec<MetricPoint>) -> StorageResult<()> {
        debug!("storing {} points in memory", points.len());
        self.batches.lock().push(points);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let batches = self.batches.lock();
        let mut metadata = HashMap::new();
        metadata.insert("batches".to_string(), batches.len().to_string());
        metadata.insert(
            "points".to_string(),
            batches.iter().map(Vec::len).sum::<usize>().to_string(),
        );

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage: operational".to_string(),
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
