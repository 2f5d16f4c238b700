//! Sends change records directly to the Buildbot change hook.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::WebhookError;
use crate::http::HttpGateway;

/// Fields the change hook accepts; everything else is dropped.
const ALLOWED_KEYS: [&str; 9] = [
    "category",
    "project",
    "repository",
    "branch",
    "revision",
    "author",
    "comments",
    "properties",
    "files",
];

/// Publishes changes to Buildbot's `change_hook/base` endpoint.
pub struct BuildbotPublisher {
    host: String,
    port: u16,
    username: String,
    password: String,
    http: Arc<dyn HttpGateway>,
}

impl BuildbotPublisher {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        http: Arc<dyn HttpGateway>,
    ) -> Self {
        BuildbotPublisher {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            http,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Send one change to Buildbot. Transport failures and non-200
    /// responses are logged and reported as `false`.
    pub async fn publish(&self, change: &Value) -> bool {
        match self.try_publish(change).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, host = %self.host, "failed to send change to buildbot");
                false
            }
        }
    }

    async fn try_publish(&self, change: &Value) -> Result<(), WebhookError> {
        let data = filter_change(change);
        let url = format!("{}/change_hook/base", self.base_url());
        info!(%url, "sending change to buildbot");
        let status = self
            .http
            .post_json(&url, &Value::Array(vec![data]), &self.username, &self.password)
            .await?;
        if status == 200 {
            Ok(())
        } else {
            Err(WebhookError::Status(status))
        }
    }

    /// Whether the Buildbot instance answers its root url with 200.
    pub async fn is_available(&self) -> bool {
        debug!(host = %self.host, "checking buildbot availability");
        match self.http.get(&self.base_url()).await {
            Ok(200) => true,
            Ok(status) => {
                debug!(status, "buildbot liveness check failed");
                false
            }
            Err(err) => {
                debug!(error = %err, "buildbot unreachable");
                false
            }
        }
    }
}

/// Keep only the allow-listed keys; absent and null values are dropped so
/// the posted payload mirrors field presence in the record.
fn filter_change(change: &Value) -> Value {
    let mut filtered = Map::new();
    if let Some(object) = change.as_object() {
        for key in ALLOWED_KEYS {
            if let Some(value) = object.get(key) {
                if !value.is_null() {
                    filtered.insert(key.to_string(), value.clone());
                }
            }
        }
    }
    Value::Object(filtered)
}
