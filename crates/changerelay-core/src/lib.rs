//! changerelay core - change extraction and delivery
//!
//! Bridges version-control hook events (Git post-receive, Subversion
//! post-commit) to a CI trigger endpoint through a durable message queue:
//!
//! - extract normalized change records from raw hook input, including
//!   force-push rewinds and Subversion branch classification
//! - publish each record to a durable queue, falling back to direct
//!   webhook delivery with bounded retries
//! - consume records and forward them to the CI webhook with
//!   at-least-once ack/nack semantics and reconnect backoff

pub mod broker;
pub mod change;
pub mod client;
pub mod config;
pub mod consume;
pub mod error;
pub mod fakes;
pub mod filter;
pub mod gateway;
pub mod http;
pub mod publish;
pub mod server;
pub mod source;

// Re-export key types
pub use broker::{AmqpConnector, BrokerConnection, BrokerConnector, Delivery};
pub use change::ChangeRecord;
pub use client::Client;
pub use config::Config;
pub use consume::{BrokerConsumer, ConsumerState, DeliveryHandler};
pub use error::{BrokerError, ConfigError, GatewayError, WebhookError};
pub use filter::{parse_filters, BranchFilter};
pub use gateway::{ShellGateway, VcsGateway};
pub use http::{HttpGateway, ReqwestGateway};
pub use publish::{BrokerPublisher, BuildbotPublisher};
pub use server::Server;
pub use source::{ChangeSource, GitChangeSource, SvnChangeSource};
