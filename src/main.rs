//! receptor-satellite - runs Ansible playbooks through Satellite
//!
//! This is the main entry point of the worker process. Directives are read as
//! JSON lines from stdin; protocol messages are written as JSON lines to
//! stdout.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use cli::{Cli, LogFormat};
use receptor_satellite::config::WorkerConfig;
use receptor_satellite::response::{ChannelSink, ResponseQueue};
use receptor_satellite::satellite::HealthStatus;
use receptor_satellite::worker::{Directive, Worker};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbosity(), cli.log_format);

    let config = match WorkerConfig::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(e.exit_code());
        }
    };
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }

    if cli.check_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let (sink, mut messages) = ChannelSink::new();
    let worker = Worker::new(&config, ResponseQueue::new(Arc::new(sink)));

    let (lines_tx, lines_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(lines_rx));

    let forward_tx = lines_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => {
                    if forward_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize message: {}", e),
            }
        }
    });

    let mut tasks = JoinSet::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin
        .next_line()
        .await
        .context("Failed to read directive")?
    {
        if line.trim().is_empty() {
            continue;
        }

        let directive = match Directive::parse(&line) {
            Ok(directive) => directive,
            Err(e) => {
                warn!("Ignoring directive: {}", e);
                continue;
            }
        };

        let worker = worker.clone();
        let lines_tx = lines_tx.clone();
        tasks.spawn(async move {
            if let Some(status) = worker.dispatch(directive).await {
                send_health_status(&lines_tx, &status);
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Directive task failed: {}", e);
        }
    }

    drop(worker);
    drop(lines_tx);
    forwarder.await.context("Message forwarder failed")?;
    writer.await.context("Output writer failed")??;

    Ok(())
}

/// Queues a health check result for stdout. Returns whether it was queued.
fn send_health_status(lines: &mpsc::UnboundedSender<String>, status: &HealthStatus) -> bool {
    let line = match serde_json::to_string(status) {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to serialize health status: {}", e);
            return false;
        }
    };
    if lines.send(line).is_err() {
        warn!(
            "Dropping health status for {}: output writer closed",
            status.satellite_instance_id
        );
        return false;
    }
    true
}

/// Writes each line to stdout, flushing after every line.
async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
