//! End-to-end tests: producers → PointBuffer → backend
//!
//! Rounds are triggered with `fire_now` so the tests never wait for a wall
//! clock boundary.

use std::sync::Arc;
use std::time::Duration;

use group_graphs::MessageEvents;
use group_graphs::actors::buffer::PointBuffer;
use group_graphs::actors::probe::UnreadProbe;
use group_graphs::actors::scheduler::RoundHandle;
use group_graphs::aggregator::Aggregator;
use group_graphs::config::InfluxConfig;
use group_graphs::storage::Precision;
use group_graphs::storage::influx::InfluxBackend;
use group_graphs::storage::memory::MemoryBackend;
use group_graphs::upstream::VkApi;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_message_round_reaches_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let aggregator = Arc::new(Aggregator::new(Arc::new(buffer.clone())));

    for _ in 0..3 {
        aggregator.on_message_reply(7);
    }
    aggregator.on_message_reply(9);

    let round = RoundHandle::spawn("messages", Duration::from_secs(3600), aggregator.clone())
        .unwrap();
    round.fire_now().await.unwrap();

    assert_eq!(buffer.flush().await.unwrap(), 2);

    assert_eq!(
        counts_by_agent(&backend.points()),
        BTreeMap::from([("7".to_string(), 3), ("9".to_string(), 1)])
    );
    assert_eq!(aggregator.pending_keys(), 0);

    round.shutdown().await.unwrap();
    buffer.shutdown().await;
}

#[tokio::test]
async fn test_idle_round_writes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let aggregator = Arc::new(Aggregator::new(Arc::new(buffer.clone())));

    let round = RoundHandle::spawn("messages", Duration::from_secs(3600), aggregator).unwrap();
    round.fire_now().await.unwrap();

    assert_eq!(buffer.flush().await.unwrap(), 0);
    assert!(backend.batches().is_empty());

    round.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unread_round_reaches_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/method/messages.getConversations"))
        .and(query_param("group_id", "42"))
        .and(query_param("count", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": { "count": 10, "unread_count": 4, "items": [] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());

    let api = VkApi::with_base_url(format!("{}/method", mock_server.uri()), "tok", "5.103")
        .unwrap();
    let probe = UnreadProbe::new(Arc::new(api), Arc::new(buffer.clone()), "42".to_string());

    let round = RoundHandle::spawn("unread", Duration::from_secs(300), Arc::new(probe)).unwrap();
    round.fire_now().await.unwrap();

    assert_eq!(buffer.flush().await.unwrap(), 1);

    let points = backend.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].measurement(), "unread");
    assert_eq!(integer_field(&points[0], "unread"), 4);

    round.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_points_written_as_line_protocol() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("bucket", "graphs"))
        .and(query_param("precision", "s"))
        .and(header("Authorization", "Token secret-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = InfluxBackend::new(InfluxConfig {
        url: mock_server.uri(),
        org: "community".to_string(),
        bucket: "graphs".to_string(),
        token: "secret-token".to_string(),
        precision: Precision::Seconds,
    })
    .unwrap();

    let buffer = PointBuffer::spawn(Arc::new(backend), &manual_buffer_config());
    let aggregator = Aggregator::new(Arc::new(buffer.clone()));

    aggregator.record(7);
    aggregator.record(7);
    aggregator.flush();

    assert_eq!(buffer.flush().await.unwrap(), 1);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(
        body.starts_with("messages,agent=7 messages=2i "),
        "unexpected body: {body}"
    );
}

#[tokio::test]
async fn test_shutdown_writes_final_window() {
    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let aggregator = Aggregator::new(Arc::new(buffer.clone()));

    aggregator.record(1);
    aggregator.record(2);
    buffer.add_point(unread_point(5));

    // Same order as the binary: flush the open window, then stop the buffer
    aggregator.flush();
    buffer.shutdown().await;

    assert_eq!(backend.total_points(), 3);
    assert_eq!(
        counts_by_agent(&backend.points()),
        BTreeMap::from([("1".to_string(), 1), ("2".to_string(), 1)])
    );
}

#[tokio::test]
async fn test_time_trigger_flushes_without_request() {
    let backend = Arc::new(MemoryBackend::new());
    let mut config = manual_buffer_config();
    config.flush_interval_secs = 1;
    let buffer = PointBuffer::spawn(backend.clone(), &config);

    buffer.add_point(unread_point(1));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(backend.total_points(), 1);
}
