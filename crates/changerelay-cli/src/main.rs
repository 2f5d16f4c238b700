//! changerelay - hook-side client
//!
//! Invoked from a Git post-receive or Subversion post-commit hook.
//! Extracts the change records for the event and publishes each to the
//! delivery queue, falling back to direct Buildbot delivery when the
//! queue does not accept a record.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use changerelay_core::source::ChangeSource;
use changerelay_core::{
    AmqpConnector, BrokerPublisher, BuildbotPublisher, Client, Config, GitChangeSource,
    ReqwestGateway, ShellGateway, SvnChangeSource, VcsGateway,
};

#[derive(Parser)]
#[command(name = "changerelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish VCS hook changes to the CI delivery queue", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CHANGERELAY_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_tracing(&config.log);

    let gateway: Arc<dyn VcsGateway> = Arc::new(ShellGateway::new());
    let source: Box<dyn ChangeSource> = if let Some(git) = &config.git {
        Box::new(
            GitChangeSource::new(&git.repository, gateway)
                .with_first_parent(git.first_parent),
        )
    } else if let Some(svn) = &config.svn {
        Box::new(SvnChangeSource::new(&svn.repository, svn.filters()?, gateway))
    } else {
        anyhow::bail!("config declares neither [git] nor [svn]");
    };

    let connector = AmqpConnector::new(
        &config.broker.host,
        config.broker.port,
        &config.broker.username,
        &config.broker.password,
    );
    let broker = BrokerPublisher::new(Arc::new(connector), &config.broker.queue);
    let buildbot = Arc::new(BuildbotPublisher::new(
        &config.buildbot.host,
        config.buildbot.port,
        &config.buildbot.username,
        &config.buildbot.password,
        Arc::new(ReqwestGateway::new()),
    ));

    let mut client = Client::new(
        source,
        broker,
        buildbot,
        Duration::from_secs(config.client.retry_timeout),
        config.client.max_retries,
    );

    // A hook that exits non-zero can block the VCS operation, so extraction
    // failures are logged rather than surfaced as an exit code.
    if let Err(err) = client.run().await {
        error!(error = %err, "change extraction failed");
    }
    Ok(())
}

fn init_tracing(log: &changerelay_core::config::LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(log.level.as_deref().unwrap_or("info"))
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match log.file.as_deref().map(std::fs::File::create) {
        Some(Ok(file)) => builder.with_writer(std::sync::Arc::new(file)).init(),
        Some(Err(err)) => {
            builder.init();
            tracing::warn!(error = %err, "could not open log file, logging to stderr");
        }
        None => builder.init(),
    }
}
