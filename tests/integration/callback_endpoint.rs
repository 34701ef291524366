//! Callback endpoint wired to a real Aggregator and PointBuffer

use std::collections::BTreeMap;
use std::sync::Arc;

use group_graphs::actors::buffer::PointBuffer;
use group_graphs::aggregator::Aggregator;
use group_graphs::storage::memory::MemoryBackend;
use group_graphs::webhook::{WebhookConfig, spawn_webhook_server};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;

use crate::helpers::*;

struct TestServer {
    url: String,
    aggregator: Arc<Aggregator>,
    buffer: PointBuffer,
    backend: Arc<MemoryBackend>,
}

async fn start(secret: &str) -> TestServer {
    let backend = Arc::new(MemoryBackend::new());
    let buffer = PointBuffer::spawn(backend.clone(), &manual_buffer_config());
    let aggregator = Arc::new(Aggregator::new(Arc::new(buffer.clone())));

    let config = WebhookConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        confirmation: "d8f3a1b2".to_string(),
        secret: secret.to_string(),
    };
    let addr = spawn_webhook_server(config, aggregator.clone())
        .await
        .unwrap();

    TestServer {
        url: format!("http://{addr}/"),
        aggregator,
        buffer,
        backend,
    }
}

fn message_reply(from_id: i64, secret: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "message_reply",
        "group_id": 42,
        "secret": secret,
        "object": {
            "id": 100,
            "date": 1709305200,
            "peer_id": 2000000001,
            "from_id": from_id,
            "text": "thanks for reaching out"
        }
    })
}

#[tokio::test]
async fn test_replies_are_counted_per_author() {
    let server = start("s3cret").await;
    let client = reqwest::Client::new();

    for from_id in [7, 7, 7, 9] {
        let response = client
            .post(&server.url)
            .json(&message_reply(from_id, "s3cret"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    assert_eq!(server.aggregator.pending_total(), 4);

    server.aggregator.flush();
    server.buffer.flush().await.unwrap();

    assert_eq!(
        counts_by_agent(&server.backend.points()),
        BTreeMap::from([("7".to_string(), 3), ("9".to_string(), 1)])
    );
}

#[tokio::test]
async fn test_rejected_callbacks_are_not_counted() {
    let server = start("s3cret").await;
    let client = reqwest::Client::new();

    let wrong_secret = client
        .post(&server.url)
        .json(&message_reply(7, "nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_secret.status(), StatusCode::FORBIDDEN);
    assert_eq!(wrong_secret.text().await.unwrap(), "Invalid secret");

    let malformed = client
        .post(&server.url)
        .header("Content-Type", "application/json")
        .body("{\"type\":")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.aggregator.pending_total(), 0);
}

#[tokio::test]
async fn test_confirmation_returns_configured_string() {
    let server = start("").await;

    let response = reqwest::Client::new()
        .post(&server.url)
        .json(&serde_json::json!({ "type": "confirmation", "group_id": 42 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "d8f3a1b2");
    assert_eq!(server.aggregator.pending_total(), 0);
}
