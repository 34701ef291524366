//! Helper functions for integration tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use group_graphs::config::BufferConfig;
use group_graphs::storage::backend::HealthStatus;
use group_graphs::storage::{FieldValue, MetricPoint, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;

/// Buffer config whose time trigger never fires during a test
pub fn manual_buffer_config() -> BufferConfig {
    BufferConfig {
        flush_interval_secs: 3600,
        max_batch_size: 10_000,
        write_timeout_secs: 1,
    }
}

pub fn unread_point(value: i64) -> MetricPoint {
    let fields = BTreeMap::from([("unread".to_string(), FieldValue::Integer(value))]);
    MetricPoint::new("unread", BTreeMap::new(), fields, Utc::now()).unwrap()
}

pub fn integer_field(point: &MetricPoint, key: &str) -> i64 {
    match point.field(key) {
        Some(FieldValue::Integer(n)) => *n,
        other => panic!("expected integer field {key}, got {other:?}"),
    }
}

/// Message counts per `agent` tag across all points
pub fn counts_by_agent(points: &[MetricPoint]) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for point in points.iter().filter(|p| p.measurement() == "messages") {
        let agent = point.tag("agent").unwrap().to_string();
        *counts.entry(agent).or_default() += integer_field(point, "messages");
    }
    counts
}

/// Backend that rejects the first `failures` writes and records the rest
pub struct FlakyBackend {
    failures: usize,
    attempts: AtomicUsize,
    written: Mutex<Vec<Vec<MetricPoint>>>,
}

impl FlakyBackend {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<MetricPoint>> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn write_batch(&self, points: Vec<MetricPoint>) -> StorageResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(StorageError::WriteRejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        self.written.lock().push(points);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "flaky".to_string(),
            metadata: HashMap::new(),
        })
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Backend whose writes take `delay` before succeeding
pub struct SlowBackend {
    delay: Duration,
    written: Mutex<Vec<Vec<MetricPoint>>>,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn written(&self) -> Vec<Vec<MetricPoint>> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl StorageBackend for SlowBackend {
    async fn write_batch(&self, points: Vec<MetricPoint>) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.written.lock().push(points);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "slow".to_string(),
            metadata: HashMap::new(),
        })
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}
