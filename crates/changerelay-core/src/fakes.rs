//! In-memory fakes for the capability traits (testing only)
//!
//! `MemoryBroker`, `MemoryHttpGateway`, and `ScriptedGateway` satisfy the
//! trait contracts without a broker, a Buildbot, or a working copy. The
//! broker fake reports a disconnect once its queue is drained, which gives
//! consumer tests a deterministic end of stream.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::broker::{BrokerConnection, BrokerConnector, Delivery};
use crate::error::{BrokerError, GatewayError, WebhookError};
use crate::gateway::VcsGateway;
use crate::http::HttpGateway;

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BrokerInner {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    consume_queue: Option<String>,
    in_flight: HashMap<u64, Vec<u8>>,
    requeued: Vec<Vec<u8>>,
    acked: Vec<u64>,
    next_tag: u64,
    fail_connect: bool,
    fail_publish: bool,
}

/// In-memory broker shared by every connection it hands out.
///
/// Negative-acknowledged messages are parked in a `requeued` list for
/// inspection instead of being redelivered, so drain-style tests terminate.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connection attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.lock().unwrap().fail_connect = fail;
    }

    /// Make subsequent publishes fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publish = fail;
    }

    /// Preload a message as if it had been published earlier.
    pub fn push_message(&self, queue: &str, body: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(body);
    }

    /// Bodies currently sitting in a queue.
    pub fn queued(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Bodies that were negative-acknowledged with requeue.
    pub fn requeued(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().requeued.clone()
    }

    /// Number of acknowledged deliveries.
    pub fn acked_count(&self) -> usize {
        self.inner.lock().unwrap().acked.len()
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if self.inner.lock().unwrap().fail_connect {
            return Err(BrokerError::Connect("connection refused".to_string()));
        }
        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Mutex<BrokerInner>>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_publish {
            return Err(BrokerError::Transport("publish refused".to_string()));
        }
        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(body.to_vec());
        Ok(())
    }

    async fn start_consumer(&self, queue: &str) -> Result<(), BrokerError> {
        self.inner.lock().unwrap().consume_queue = Some(queue.to_string());
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Delivery, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.consume_queue.clone().ok_or(BrokerError::Disconnected)?;
        match inner.queues.entry(queue).or_default().pop_front() {
            Some(body) => {
                inner.next_tag += 1;
                let tag = inner.next_tag;
                inner.in_flight.insert(tag, body.clone());
                Ok(Delivery { tag, body })
            }
            // Queue drained: simulate the broker dropping the connection.
            None => Err(BrokerError::Disconnected),
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight.remove(&tag);
        inner.acked.push(tag);
        Ok(())
    }

    async fn nack_requeue(&self, tag: u64) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(body) = inner.in_flight.remove(&tag) {
            inner.requeued.push(body);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryHttpGateway
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HttpInner {
    posts: Vec<PostedRequest>,
    gets: Vec<String>,
    post_status: u16,
    get_status: u16,
}

/// One recorded POST.
#[derive(Debug, Clone)]
pub struct PostedRequest {
    pub url: String,
    pub body: Value,
}

/// Records HTTP calls and answers with configurable statuses.
#[derive(Debug)]
pub struct MemoryHttpGateway {
    inner: Mutex<HttpInner>,
}

impl MemoryHttpGateway {
    pub fn new() -> Self {
        MemoryHttpGateway {
            inner: Mutex::new(HttpInner {
                posts: Vec::new(),
                gets: Vec::new(),
                post_status: 200,
                get_status: 200,
            }),
        }
    }

    pub fn set_post_status(&self, status: u16) {
        self.inner.lock().unwrap().post_status = status;
    }

    pub fn set_get_status(&self, status: u16) {
        self.inner.lock().unwrap().get_status = status;
    }

    /// Bodies of every recorded POST, in call order.
    pub fn posts(&self) -> Vec<PostedRequest> {
        self.inner.lock().unwrap().posts.clone()
    }

    pub fn get_count(&self) -> usize {
        self.inner.lock().unwrap().gets.len()
    }
}

impl Default for MemoryHttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpGateway for MemoryHttpGateway {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        _username: &str,
        _password: &str,
    ) -> Result<u16, WebhookError> {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.push(PostedRequest {
            url: url.to_string(),
            body: body.clone(),
        });
        Ok(inner.post_status)
    }

    async fn get(&self, url: &str) -> Result<u16, WebhookError> {
        let mut inner = self.inner.lock().unwrap();
        inner.gets.push(url.to_string());
        Ok(inner.get_status)
    }
}

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

/// VCS gateway that replays canned command output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    hook_input: String,
    commits: String,
    merge_base: String,
    commit_info: String,
    commit_infos: HashMap<String, String>,
    diff: String,
    svn_changed: String,
    svn_author: String,
    svn_message: String,
    svn_revision: String,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook_input(mut self, input: &str) -> Self {
        self.hook_input = input.to_string();
        self
    }

    pub fn with_commits(mut self, listing: &str) -> Self {
        self.commits = listing.to_string();
        self
    }

    pub fn with_merge_base(mut self, rev: &str) -> Self {
        self.merge_base = rev.to_string();
        self
    }

    /// Commit metadata returned for any revision without a specific script.
    pub fn with_commit_info(mut self, info: &str) -> Self {
        self.commit_info = info.to_string();
        self
    }

    /// Commit metadata for one specific revision.
    pub fn with_commit_info_for(mut self, rev: &str, info: &str) -> Self {
        self.commit_infos.insert(rev.to_string(), info.to_string());
        self
    }

    pub fn with_diff(mut self, diff: &str) -> Self {
        self.diff = diff.to_string();
        self
    }

    pub fn with_svn_changed(mut self, changed: &str) -> Self {
        self.svn_changed = changed.to_string();
        self
    }

    pub fn with_svn_author(mut self, author: &str) -> Self {
        self.svn_author = author.to_string();
        self
    }

    pub fn with_svn_message(mut self, message: &str) -> Self {
        self.svn_message = message.to_string();
        self
    }

    pub fn with_svn_revision(mut self, revision: &str) -> Self {
        self.svn_revision = revision.to_string();
        self
    }
}

#[async_trait]
impl VcsGateway for ScriptedGateway {
    async fn git_hook_input(&self) -> Result<String, GatewayError> {
        Ok(self.hook_input.clone())
    }

    async fn git_commits(
        &self,
        _refname: &str,
        _newrev: &str,
        _baserev: Option<&str>,
        _first_parent: bool,
        _new_branch: bool,
    ) -> Result<String, GatewayError> {
        Ok(self.commits.clone())
    }

    async fn git_merge_base(&self, _oldrev: &str, _newrev: &str) -> Result<String, GatewayError> {
        Ok(self.merge_base.clone())
    }

    async fn git_commit_info(&self, rev: &str) -> Result<String, GatewayError> {
        Ok(self
            .commit_infos
            .get(rev)
            .cloned()
            .unwrap_or_else(|| self.commit_info.clone()))
    }

    async fn git_diff(&self, _oldrev: &str, _newrev: &str) -> Result<String, GatewayError> {
        Ok(self.diff.clone())
    }

    async fn svn_changed(&self, _rev_arg: &str, _repository: &str) -> Result<String, GatewayError> {
        Ok(self.svn_changed.clone())
    }

    async fn svn_author(&self, _rev_arg: &str, _repository: &str) -> Result<String, GatewayError> {
        Ok(self.svn_author.clone())
    }

    async fn svn_message(&self, _rev_arg: &str, _repository: &str) -> Result<String, GatewayError> {
        Ok(self.svn_message.clone())
    }

    async fn svn_revision(&self, _rev_arg: &str, _repository: &str) -> Result<String, GatewayError> {
        Ok(self.svn_revision.clone())
    }
}
