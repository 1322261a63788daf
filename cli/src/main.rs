// relaynode: run a circuit relay node until interrupted
//
// Operator output (address line, prompt) goes to stdout, logs to stderr.

mod args;

use anyhow::{Context, Result};
use args::Cli;
use clap::Parser;
use relaynode_core::{Libp2pStack, ShutdownSignal};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.node_config()?;

    let shutdown = ShutdownSignal::from_os().context("Failed to install signal handlers")?;

    let mut stdout = std::io::stdout();
    let report = relaynode_core::run(&Libp2pStack, &config, &mut stdout, shutdown)
        .await
        .context("Relay node failed to start")?;

    tracing::info!(
        "Stopped after {} signal, {} listener(s) closed",
        report.reason,
        report.listeners_closed
    );

    Ok(())
}
