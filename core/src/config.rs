// Node configuration
//
// Defaults reproduce the reference relay: one WebRTC-direct listener on an
// ephemeral UDP port on all interfaces, relay-client support enabled. A JSON
// file and CLI flags may override any field. Nothing here is ever written back.

use crate::BootstrapError;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Listen pattern used when nothing else is configured
pub const DEFAULT_LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/udp/0/webrtc-direct";

/// Circuit lifetime before the relay drops it (one day)
pub const DEFAULT_MAX_CIRCUIT_DURATION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The single transport a node is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// UDP with WebRTC framing, reachable from browsers
    WebrtcDirect,
    /// QUIC v1 over UDP
    Quic,
    /// TCP secured with noise and the configured multiplexer
    Tcp,
}

impl TransportKind {
    /// Whether a listen address can be bound by this transport
    pub fn supports(&self, addr: &Multiaddr) -> bool {
        let mut has_tcp = false;
        let mut has_quic = false;
        let mut has_webrtc = false;
        let mut has_ws = false;

        for protocol in addr.iter() {
            match protocol {
                Protocol::Tcp(_) => has_tcp = true,
                Protocol::QuicV1 => has_quic = true,
                Protocol::WebRTCDirect => has_webrtc = true,
                Protocol::Ws(_) | Protocol::Wss(_) => has_ws = true,
                _ => {}
            }
        }

        match self {
            TransportKind::WebrtcDirect => has_webrtc,
            TransportKind::Quic => has_quic && !has_webrtc,
            TransportKind::Tcp => has_tcp && !has_ws,
        }
    }

    /// Whether the transport brings its own stream multiplexing
    pub fn is_natively_multiplexed(&self) -> bool {
        matches!(self, TransportKind::WebrtcDirect | TransportKind::Quic)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebrtcDirect => write!(f, "webrtc-direct"),
            TransportKind::Quic => write!(f, "quic"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webrtc-direct" | "webrtc" => Ok(TransportKind::WebrtcDirect),
            "quic" | "quic-v1" => Ok(TransportKind::Quic),
            "tcp" => Ok(TransportKind::Tcp),
            other => Err(format!("unknown transport: {}", other)),
        }
    }
}

/// Stream multiplexer registered with the transport stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplexer {
    Yamux,
    Mplex,
}

impl Multiplexer {
    /// Protocol id negotiated on the wire
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Multiplexer::Yamux => "/yamux/1.0.0",
            Multiplexer::Mplex => "/mplex/6.7.0",
        }
    }
}

impl fmt::Display for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}

impl FromStr for Multiplexer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yamux" | "/yamux/1.0.0" => Ok(Multiplexer::Yamux),
            "mplex" | "/mplex/6.7.0" => Ok(Multiplexer::Mplex),
            other => Err(format!("unknown multiplexer: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Abort startup when relay serving cannot be activated
    pub required: bool,

    /// Maximum lifetime of a relayed circuit in seconds
    pub max_circuit_duration_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            required: false,
            max_circuit_duration_secs: DEFAULT_MAX_CIRCUIT_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Listen patterns, one listener each
    pub listen_addresses: Vec<String>,

    /// Transport used for every listener
    pub transport: TransportKind,

    /// Multiplexer for stream-oriented connections
    pub multiplexer: Multiplexer,

    /// Allow our own connections to traverse other relays
    pub relay_client: bool,

    /// Publicly reachable addresses to register as external addresses
    pub announce_addresses: Vec<String>,

    /// Protobuf-encoded keypair to use instead of a fresh one
    pub identity_file: Option<PathBuf>,

    /// How long bootstrap waits for every listener to report an address
    pub bind_timeout_secs: u64,

    /// Idle connections are closed after this many seconds
    pub idle_connection_timeout_secs: u64,

    /// Relay serving settings
    pub relay: RelaySettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addresses: vec![DEFAULT_LISTEN_ADDRESS.to_string()],
            transport: TransportKind::WebrtcDirect,
            multiplexer: Multiplexer::Mplex,
            relay_client: true,
            announce_addresses: Vec::new(),
            identity_file: None,
            bind_timeout_secs: 10,
            idle_connection_timeout_secs: 300,
            relay: RelaySettings::default(),
        }
    }
}

impl NodeConfig {
    /// Load config from a JSON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse and check every listen pattern against the configured transport.
    /// Also rejects a bind timeout no listener could ever meet.
    pub fn listen_multiaddrs(&self) -> Result<Vec<Multiaddr>, BootstrapError> {
        if self.listen_addresses.is_empty() {
            return Err(BootstrapError::NoListenAddresses);
        }
        if self.bind_timeout_secs == 0 {
            return Err(BootstrapError::ZeroBindTimeout);
        }

        self.listen_addresses
            .iter()
            .map(|raw| {
                let addr = parse_multiaddr(raw)?;
                if !self.transport.supports(&addr) {
                    return Err(BootstrapError::UnsupportedAddress {
                        addr: raw.clone(),
                        transport: self.transport,
                    });
                }
                Ok(addr)
            })
            .collect()
    }

    /// Parse the announce addresses.
    pub fn announce_multiaddrs(&self) -> Result<Vec<Multiaddr>, BootstrapError> {
        self.announce_addresses
            .iter()
            .map(|raw| parse_multiaddr(raw))
            .collect()
    }
}

fn parse_multiaddr(raw: &str) -> Result<Multiaddr, BootstrapError> {
    raw.trim()
        .parse::<Multiaddr>()
        .map_err(|e| BootstrapError::InvalidListenAddress {
            addr: raw.to_string(),
            reason: e.to_string(),
        })
}
