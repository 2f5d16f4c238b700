//! End-to-end forwarding: queue consumer to Buildbot webhook.

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use changerelay_core::fakes::{MemoryBroker, MemoryHttpGateway};
use changerelay_core::{
    BrokerConsumer, BrokerPublisher, BuildbotPublisher, ChangeRecord, Server,
};

const QUEUE: &str = "changes";

fn server(broker: &MemoryBroker, http: Arc<MemoryHttpGateway>) -> Server {
    let consumer =
        BrokerConsumer::new(Arc::new(broker.clone())).with_retry_on_disconnect(false);
    let buildbot = BuildbotPublisher::new("localhost", 8010, "user", "password", http);
    Server::new(consumer, QUEUE, buildbot)
}

#[tokio::test]
async fn consumed_changes_are_forwarded_and_acked() {
    let broker = MemoryBroker::new();
    let publisher = BrokerPublisher::new(Arc::new(broker.clone()), QUEUE);

    let mut change = ChangeRecord::new("83060a21145596e42d985c798c32aa4b581b7b4f");
    change.branch = Some("master".to_string());
    change.author = Some("user".to_string());
    change.set_files(vec!["somefile.txt".to_string()]);
    assert!(publisher.publish(&change).await);

    let http = Arc::new(MemoryHttpGateway::new());
    server(&broker, Arc::clone(&http))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(broker.acked_count(), 1);
    let posts = http.posts();
    assert_eq!(posts.len(), 1);
    let posted = &posts[0].body[0];
    assert_eq!(posted.get("revision").unwrap(), &change.revision);
    assert_eq!(posted.get("branch").unwrap(), "master");
    // The record arrived sparse, so the payload stays sparse.
    assert!(posted.get("comments").is_none());
    assert!(posted.get("repository").is_none());
}

#[tokio::test]
async fn unavailable_buildbot_leaves_the_message_requeued() {
    let broker = MemoryBroker::new();
    let body = serde_json::to_vec(&ChangeRecord::new("abc123")).unwrap();
    broker.push_message(QUEUE, body.clone());

    let http = Arc::new(MemoryHttpGateway::new());
    http.set_get_status(503);
    server(&broker, Arc::clone(&http))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(broker.acked_count(), 0);
    assert_eq!(broker.requeued(), vec![body]);
    // Liveness failed, so no change was posted.
    assert!(http.posts().is_empty());
}

#[tokio::test]
async fn failed_forward_leaves_the_message_requeued() {
    let broker = MemoryBroker::new();
    let body = serde_json::to_vec(&ChangeRecord::new("abc123")).unwrap();
    broker.push_message(QUEUE, body.clone());

    let http = Arc::new(MemoryHttpGateway::new());
    http.set_post_status(500);
    server(&broker, Arc::clone(&http))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(broker.acked_count(), 0);
    assert_eq!(broker.requeued(), vec![body]);
}

#[tokio::test]
async fn malformed_message_bodies_are_requeued_without_posting() {
    let broker = MemoryBroker::new();
    broker.push_message(QUEUE, b"not json at all".to_vec());

    let http = Arc::new(MemoryHttpGateway::new());
    server(&broker, Arc::clone(&http))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(broker.acked_count(), 0);
    assert_eq!(broker.requeued().len(), 1);
    assert!(http.posts().is_empty());
}

#[tokio::test]
async fn forwarded_payload_round_trips_the_published_record() {
    let broker = MemoryBroker::new();
    let publisher = BrokerPublisher::new(Arc::new(broker.clone()), QUEUE);

    let mut change = ChangeRecord::new("f5934acec8193597e0ee60e1be99b0c18654a222");
    change.branch = Some("master".to_string());
    change.repository = Some("repository".to_string());
    change.comments = Some("rewind".to_string());
    change.author = Some("dummy".to_string());
    change.set_files(vec!["FILE1.txt".to_string(), "FILE2.txt".to_string()]);
    assert!(publisher.publish(&change).await);

    let http = Arc::new(MemoryHttpGateway::new());
    server(&broker, Arc::clone(&http))
        .run(&CancellationToken::new())
        .await;

    let posted = http.posts()[0].body[0].clone();
    let expected: Value = serde_json::to_value(&change).unwrap();
    assert_eq!(posted, expected);
}
