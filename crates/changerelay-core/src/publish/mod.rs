//! Publish-side delivery: durable queue first, CI webhook as fallback.

pub mod broker;
pub mod buildbot;

pub use broker::BrokerPublisher;
pub use buildbot::BuildbotPublisher;
