//! Error types for changerelay-core

use thiserror::Error;

/// Errors raised while running VCS commands or reading hook input.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Command could not be spawned
    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    /// I/O error while talking to a child process or hook stdin
    #[error("Command I/O failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

/// Errors raised by the message broker transport.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection to the broker could not be established
    #[error("Broker connection failed: {0}")]
    Connect(String),

    /// A channel operation (declare, publish, ack) failed
    #[error("Broker operation failed: {0}")]
    Transport(String),

    /// The delivery stream ended or the broker dropped the connection
    #[error("Connection closed by broker")]
    Disconnected,

    /// Message body could not be serialized
    #[error("Message serialization failed: {0}")]
    Serialization(String),
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

/// Errors raised by the CI webhook transport.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The HTTP request itself failed
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),
}

impl From<reqwest::Error> for WebhookError {
    fn from(err: reqwest::Error) -> Self {
        WebhookError::Request(err.to_string())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Read(String),

    /// Config file could not be parsed
    #[error("Failed to parse config file: {0}")]
    Parse(String),

    /// A branch filter clause is malformed
    #[error("Invalid branch filter clause {clause:?}: {reason}")]
    Filter { clause: String, reason: String },

    /// The configuration is structurally invalid
    #[error("{0}")]
    Invalid(String),
}
