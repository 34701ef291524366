//! Failure tests for the pipelines
//!
//! These tests verify that failures stay contained:
//! - A failed write drops its batch and nothing else
//! - A slow backend never delays producers
//! - Upstream failures skip a round without emitting points
//! - A failing round does not stop the scheduler

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use group_graphs::actors::buffer::PointBuffer;
use group_graphs::actors::probe::UnreadProbe;
use group_graphs::actors::scheduler::RoundHandle;
use group_graphs::storage::memory::MemoryBackend;
use group_graphs::upstream::{ApiError, UpstreamApi, VkApi};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_failed_write_drops_only_its_batch() {
    let backend = Arc::new(FlakyBackend::new(1));
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());

    buffer.add_point(unread_point(1));
    buffer.add_point(unread_point(2));
    assert!(buffer.flush().await.is_err());

    buffer.add_point(unread_point(3));
    assert_eq!(buffer.flush().await.unwrap(), 1);

    // The rejected batch is not retried or merged into the next one
    let written = backend.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].len(), 1);
    assert_eq!(integer_field(&written[0][0], "unread"), 3);
    assert_eq!(backend.attempts(), 2);

    let stats = buffer.get_stats().await.unwrap();
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(stats.points_dropped, 2);
    assert_eq!(stats.batches_written, 1);
    assert_eq!(stats.points_written, 1);
}

#[tokio::test]
async fn test_slow_backend_does_not_block_producers() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(500)));
    let mut config = manual_buffer_config();
    config.max_batch_size = 10;
    config.write_timeout_secs = 5;
    let buffer = PointBuffer::spawn(backend.clone(), &config);

    let start = Instant::now();
    for i in 0..1000 {
        buffer.add_point(unread_point(i));
    }
    assert!(
        start.elapsed() < Duration::from_millis(250),
        "add_point waited for the backend: {:?}",
        start.elapsed()
    );

    // Shutdown waits for every in-flight write
    buffer.shutdown().await;

    let written = backend.written();
    assert_eq!(written.iter().map(Vec::len).sum::<usize>(), 1000);
    assert!(written.iter().all(|batch| batch.len() <= 10));
}

#[tokio::test]
async fn test_api_error_skips_round() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/method/messages.getConversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": { "error_code": 5, "error_msg": "User authorization failed" }
        })))
        .mount(&mock_server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());

    let api = Arc::new(
        VkApi::with_base_url(format!("{}/method", mock_server.uri()), "bad", "5.103").unwrap(),
    );

    let error = api
        .query("messages.getConversations", &[("group_id", "42")])
        .await
        .unwrap_err();
    assert_matches!(
        error.downcast_ref::<ApiError>(),
        Some(ApiError { code: 5, .. })
    );

    let probe = UnreadProbe::new(api, Arc::new(buffer.clone()), "42".to_string());
    let round = RoundHandle::spawn("unread", Duration::from_secs(300), Arc::new(probe)).unwrap();

    assert!(round.fire_now().await.is_err());
    assert_eq!(buffer.flush().await.unwrap(), 0);
    assert!(backend.batches().is_empty());

    // The scheduler survives the failed round
    assert!(round.fire_now().await.is_err());
    assert_eq!(round.rounds_fired(), 2);

    round.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upstream_unreachable_skips_round() {
    // Nothing listens on this port
    let api = VkApi::with_base_url("http://127.0.0.1:9/method", "tok", "5.103").unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let probe = UnreadProbe::new(Arc::new(api), Arc::new(buffer.clone()), "42".to_string());

    assert!(probe.gather().await.is_err());
    assert_eq!(buffer.flush().await.unwrap(), 0);
}

#[tokio::test]
async fn test_upstream_http_error_skips_round() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let api = VkApi::with_base_url(format!("{}/method", mock_server.uri()), "tok", "5.103")
        .unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let probe = UnreadProbe::new(Arc::new(api), Arc::new(buffer.clone()), "42".to_string());

    assert!(probe.gather().await.is_err());
    assert_eq!(buffer.flush().await.unwrap(), 0);
    assert!(backend.batches().is_empty());
}
