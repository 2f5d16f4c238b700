//! Hook-side pipeline: extract changes and hand them to delivery.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::change::ChangeRecord;
use crate::error::GatewayError;
use crate::publish::{BrokerPublisher, BuildbotPublisher};
use crate::source::ChangeSource;

/// Runs one hook invocation end to end.
///
/// Each extracted record is published to the durable queue in order. A
/// record the queue does not accept gets its own background fallback task
/// that posts directly to Buildbot with bounded retries, so one slow CI
/// target never blocks publishing of the remaining records. Outstanding
/// fallback tasks are joined before [`Client::run`] returns so records are
/// not lost to process teardown.
pub struct Client {
    source: Box<dyn ChangeSource>,
    broker: BrokerPublisher,
    buildbot: Arc<BuildbotPublisher>,
    retry_timeout: Duration,
    max_retries: u32,
    fallbacks: JoinSet<()>,
}

impl Client {
    pub fn new(
        source: Box<dyn ChangeSource>,
        broker: BrokerPublisher,
        buildbot: Arc<BuildbotPublisher>,
        retry_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Client {
            source,
            broker,
            buildbot,
            retry_timeout,
            max_retries,
            fallbacks: JoinSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<(), GatewayError> {
        let changes = self.source.changes().await?;
        for change in changes {
            if self.broker.publish(&change).await {
                continue;
            }
            error!(
                revision = %change.revision,
                "failed to publish change to broker, sending to buildbot instead"
            );
            self.spawn_fallback(change);
        }
        self.join_fallbacks().await;
        Ok(())
    }

    fn spawn_fallback(&mut self, change: ChangeRecord) {
        let buildbot = Arc::clone(&self.buildbot);
        let retry_timeout = self.retry_timeout;
        let max_retries = self.max_retries;
        self.fallbacks.spawn(async move {
            fallback_publish(buildbot, change, retry_timeout, max_retries).await;
        });
    }

    async fn join_fallbacks(&mut self) {
        while self.fallbacks.join_next().await.is_some() {}
    }
}

/// Post one change directly to Buildbot, retrying up to `max_retries`
/// attempts with a fixed sleep between them. Exhaustion is terminal for
/// this record only.
async fn fallback_publish(
    buildbot: Arc<BuildbotPublisher>,
    change: ChangeRecord,
    retry_timeout: Duration,
    max_retries: u32,
) {
    let value = match serde_json::to_value(&change) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, revision = %change.revision, "failed to serialize change for buildbot");
            return;
        }
    };
    for attempt in 1..=max_retries {
        if buildbot.publish(&value).await {
            return;
        }
        if attempt < max_retries {
            warn!(
                host = %buildbot.host(),
                wait_secs = retry_timeout.as_secs(),
                "failed to publish change to buildbot, waiting and trying again"
            );
            tokio::time::sleep(retry_timeout).await;
        }
    }
    error!(
        host = %buildbot.host(),
        revision = %change.revision,
        "failed to publish change to buildbot, giving up"
    );
}
