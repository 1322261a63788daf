// Command-line arguments and their overlay onto NodeConfig

use anyhow::{Context, Result};
use clap::Parser;
use relaynode_core::{Multiplexer, NodeConfig, TransportKind};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relaynode")]
#[command(about = "Circuit relay node for browser and NAT-bound peers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address pattern (repeatable)
    #[arg(short, long = "listen", value_name = "MULTIADDR")]
    pub listen: Vec<String>,

    /// Base transport: webrtc-direct, quic or tcp
    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    /// Stream multiplexer for TCP and relayed connections: yamux or mplex
    #[arg(short, long)]
    pub muxer: Option<Multiplexer>,

    /// Do not accept connections through other relays
    #[arg(long)]
    pub no_relay_client: bool,

    /// Externally reachable address to advertise (repeatable)
    #[arg(long = "announce", value_name = "MULTIADDR")]
    pub announce: Vec<String>,

    /// Protobuf-encoded keypair to use instead of a fresh identity
    #[arg(long)]
    pub identity_file: Option<PathBuf>,

    /// Abort startup if relay serving cannot be activated
    #[arg(long)]
    pub require_relay: bool,

    /// Seconds to wait for listeners to bind
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub bind_timeout: Option<u64>,
}

impl Cli {
    /// Defaults, then the config file, then flags
    pub fn node_config(&self) -> Result<NodeConfig> {
        let base = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => NodeConfig::default(),
        };

        Ok(self.apply(base))
    }

    fn apply(&self, mut config: NodeConfig) -> NodeConfig {
        if !self.listen.is_empty() {
            config.listen_addresses = self.listen.clone();
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(muxer) = self.muxer {
            config.multiplexer = muxer;
        }
        if self.no_relay_client {
            config.relay_client = false;
        }
        if !self.announce.is_empty() {
            config.announce_addresses = self.announce.clone();
        }
        if let Some(path) = &self.identity_file {
            config.identity_file = Some(path.clone());
        }
        if self.require_relay {
            config.relay.required = true;
        }
        if let Some(secs) = self.bind_timeout {
            config.bind_timeout_secs = secs;
        }
        config
    }
}
