//! Configuration for the hook client and the consumer daemon.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::filter::{parse_filters, BranchFilter};

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub buildbot: BuildbotConfig,
    #[serde(default)]
    pub git: Option<GitConfig>,
    #[serde(default)]
    pub svn: Option<SvnConfig>,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Message broker endpoint and target queue.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub queue: String,
}

/// Buildbot change-hook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildbotConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Git change source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    pub repository: String,
    #[serde(default = "default_true")]
    pub first_parent: bool,
}

/// Subversion change source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SvnConfig {
    pub repository: String,
    #[serde(default)]
    pub branch_filters: String,
}

impl SvnConfig {
    /// Parse the configured branch filter string.
    pub fn filters(&self) -> Result<Vec<BranchFilter>, ConfigError> {
        parse_filters(&self.branch_filters)
    }
}

/// Hook-side fallback settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Seconds to sleep between fallback attempts.
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout: u64,
    /// Number of direct-to-Buildbot attempts per failed record.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            retry_timeout: default_retry_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Consumer daemon settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Reconnect with backoff after a broker disconnect. Disabled only for
    /// single-shot test and administrative runs.
    #[serde(default = "default_true")]
    pub retry_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            retry_on_disconnect: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Log level directive, e.g. `"info"` or `"debug"`.
    #[serde(default)]
    pub level: Option<String>,
    /// Log file path. Hook invocations have no terminal, so logging to a
    /// file is the only way to see them; unset logs to stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(format!("{}: {}", path.display(), err)))?;
        let config: Config =
            toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.git.is_some() && self.svn.is_some() {
            return Err(ConfigError::Invalid(
                "config must not declare both [git] and [svn]".to_string(),
            ));
        }
        if let Some(svn) = &self.svn {
            svn.filters()?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    1
}
