//! HTTP capability trait for the CI webhook.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::WebhookError;

/// Minimal HTTP access consumed by the webhook publisher.
#[async_trait]
pub trait HttpGateway: Send + Sync {
    /// POST a JSON body with basic auth, returning the response status.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        username: &str,
        password: &str,
    ) -> Result<u16, WebhookError>;

    /// GET a url, returning the response status.
    async fn get(&self, url: &str) -> Result<u16, WebhookError>;
}

/// Production HTTP gateway backed by reqwest.
pub struct ReqwestGateway {
    client: reqwest::Client,
}

impl ReqwestGateway {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("changerelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        ReqwestGateway { client }
    }
}

impl Default for ReqwestGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpGateway for ReqwestGateway {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        username: &str,
        password: &str,
    ) -> Result<u16, WebhookError> {
        let response = self
            .client
            .post(url)
            .basic_auth(username, Some(password))
            .json(body)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    async fn get(&self, url: &str) -> Result<u16, WebhookError> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}
