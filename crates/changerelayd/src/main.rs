//! changerelayd - queue consumer daemon
//!
//! Consumes change records from the durable queue and forwards each to
//! the Buildbot change hook, acknowledging only after successful
//! delivery. Runs until terminated or, with retry disabled, until the
//! first broker disconnect.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use changerelay_core::{
    AmqpConnector, BrokerConsumer, BuildbotPublisher, Config, ReqwestGateway, Server,
};

#[derive(Parser)]
#[command(name = "changerelayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forward queued changes to the Buildbot change hook", long_about = None)]
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

    let connector = AmqpConnector::new(
        &config.broker.host,
        config.broker.port,
        &config.broker.username,
        &config.broker.password,
    );
    let consumer = BrokerConsumer::new(Arc::new(connector))
        .with_retry_on_disconnect(config.server.retry_on_disconnect);
    let buildbot = BuildbotPublisher::new(
        &config.buildbot.host,
        config.buildbot.port,
        &config.buildbot.username,
        &config.buildbot.password,
        Arc::new(ReqwestGateway::new()),
    );
    let server = Server::new(consumer, &config.broker.queue, buildbot);

    let shutdown = CancellationToken::new();
    let consumer_token = shutdown.clone();
    let mut consumer_task = tokio::spawn(async move {
        server.run(&consumer_token).await;
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for shutdown signal")?;
            info!("shutdown requested");
            shutdown.cancel();
            consumer_task.await.context("joining consumer task")?;
        }
        joined = &mut consumer_task => {
            joined.context("consumer task failed")?;
            info!("consumer terminated");
        }
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
