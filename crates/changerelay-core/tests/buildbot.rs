//! Buildbot webhook publishing and the hook-side fallback path.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use changerelay_core::fakes::{MemoryBroker, MemoryHttpGateway};
use changerelay_core::source::ChangeSource;
use changerelay_core::{
    BrokerPublisher, BuildbotPublisher, ChangeRecord, Client, GatewayError,
};

fn publisher(http: Arc<MemoryHttpGateway>) -> BuildbotPublisher {
    BuildbotPublisher::new("localhost", 8010, "user", "password", http)
}

#[tokio::test]
async fn publish_posts_a_single_element_array() {
    let http = Arc::new(MemoryHttpGateway::new());
    let buildbot = publisher(Arc::clone(&http));

    let change = json!({
        "branch": "master",
        "revision": "83060a21145596e42d985c798c32aa4b581b7b4f",
        "repository": "repository",
        "author": "user",
        "comments": "New Feature",
        "files": ["somefile.txt"],
    });
    assert!(buildbot.publish(&change).await);

    let posts = http.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "http://localhost:8010/change_hook/base");
    let body = posts[0].body.as_array().unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0], change);
}

#[tokio::test]
async fn publish_drops_unlisted_and_null_fields() {
    let http = Arc::new(MemoryHttpGateway::new());
    let buildbot = publisher(Arc::clone(&http));

    let change = json!({
        "revision": "abc123",
        "branch": "master",
        "author": null,
        "codebase": "unexpected",
        "when_timestamp": 12345,
    });
    assert!(buildbot.publish(&change).await);

    let posted = &http.posts()[0].body[0];
    let object = posted.as_object().unwrap();
    assert_eq!(object.len(), 2);
    assert_eq!(object.get("revision").unwrap(), "abc123");
    assert_eq!(object.get("branch").unwrap(), "master");
}

#[tokio::test]
async fn publish_reports_false_on_error_status() {
    let http = Arc::new(MemoryHttpGateway::new());
    http.set_post_status(500);
    let buildbot = publisher(http);

    assert!(!buildbot.publish(&json!({"revision": "abc123"})).await);
}

#[tokio::test]
async fn is_available_checks_the_root_url() {
    let http = Arc::new(MemoryHttpGateway::new());
    let buildbot = publisher(Arc::clone(&http));

    assert!(buildbot.is_available().await);
    http.set_get_status(503);
    assert!(!buildbot.is_available().await);
    assert_eq!(http.get_count(), 2);
}

/// Yields a fixed record list without touching any VCS.
struct StubSource {
    changes: Vec<ChangeRecord>,
}

#[async_trait]
impl ChangeSource for StubSource {
    async fn changes(&self) -> Result<Vec<ChangeRecord>, GatewayError> {
        Ok(self.changes.clone())
    }
}

fn stub_change(revision: &str) -> ChangeRecord {
    let mut change = ChangeRecord::new(revision);
    change.branch = Some("master".to_string());
    change.set_files(vec!["somefile.txt".to_string()]);
    change
}

#[tokio::test]
async fn client_publishes_to_the_queue_when_the_broker_accepts() {
    let broker = MemoryBroker::new();
    let http = Arc::new(MemoryHttpGateway::new());
    let mut client = Client::new(
        Box::new(StubSource {
            changes: vec![stub_change("rev1"), stub_change("rev2")],
        }),
        BrokerPublisher::new(Arc::new(broker.clone()), "changes"),
        Arc::new(publisher(Arc::clone(&http))),
        Duration::from_millis(1),
        3,
    );

    client.run().await.unwrap();

    assert_eq!(broker.queued("changes").len(), 2);
    assert!(http.posts().is_empty());
}

#[tokio::test]
async fn client_falls_back_to_buildbot_when_publish_fails() {
    let broker = MemoryBroker::new();
    broker.set_fail_publish(true);
    let http = Arc::new(MemoryHttpGateway::new());
    let mut client = Client::new(
        Box::new(StubSource {
            changes: vec![stub_change("rev1")],
        }),
        BrokerPublisher::new(Arc::new(broker.clone()), "changes"),
        Arc::new(publisher(Arc::clone(&http))),
        Duration::from_millis(1),
        3,
    );

    client.run().await.unwrap();

    assert!(broker.queued("changes").is_empty());
    let posts = http.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].body[0].get("revision").unwrap(), "rev1");
}

#[tokio::test]
async fn fallback_retries_are_bounded_by_max_retries() {
    let broker = MemoryBroker::new();
    broker.set_fail_publish(true);
    let http = Arc::new(MemoryHttpGateway::new());
    http.set_post_status(500);
    let mut client = Client::new(
        Box::new(StubSource {
            changes: vec![stub_change("rev1")],
        }),
        BrokerPublisher::new(Arc::new(broker), "changes"),
        Arc::new(publisher(Arc::clone(&http))),
        Duration::from_millis(1),
        3,
    );

    client.run().await.unwrap();

    // One POST per attempt, then the record is given up on.
    assert_eq!(http.posts().len(), 3);
}

#[tokio::test]
async fn fallback_tasks_do_not_block_later_records() {
    // Two failed records spawn two independent fallback tasks; both run to
    // completion before the pipeline returns.
    let broker = MemoryBroker::new();
    broker.set_fail_publish(true);
    let http = Arc::new(MemoryHttpGateway::new());
    let mut client = Client::new(
        Box::new(StubSource {
            changes: vec![stub_change("rev1"), stub_change("rev2")],
        }),
        BrokerPublisher::new(Arc::new(broker), "changes"),
        Arc::new(publisher(Arc::clone(&http))),
        Duration::from_millis(1),
        1,
    );

    client.run().await.unwrap();

    let mut revisions: Vec<String> = http
        .posts()
        .iter()
        .map(|p| p.body[0].get("revision").unwrap().as_str().unwrap().to_string())
        .collect();
    revisions.sort();
    assert_eq!(revisions, vec!["rev1", "rev2"]);
}
