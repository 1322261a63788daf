// Relaynode Core: circuit relay bootstrap
//
// Bootstrap → relay activation → address report → wait for shutdown.
// Everything below the `stack` traits (transports, relay circuits, muxing)
// belongs to libp2p.

pub mod bootstrap;
pub mod config;
pub mod identity;
pub mod lifecycle;
pub mod relay;
pub mod report;
pub mod runner;
pub mod stack;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use thiserror::Error;

pub use bootstrap::bootstrap;
pub use config::{ConfigError, Multiplexer, NodeConfig, RelaySettings, TransportKind};
pub use identity::NodeIdentity;
pub use lifecycle::{
    Controller, LifecycleState, ShutdownReason, ShutdownReport, ShutdownSignal, ShutdownTrigger,
};
pub use relay::{activate_relay, RelayStatus};
pub use report::{advertised_addresses, format_address_line, report_addresses};
pub use runner::run;
pub use stack::{NetworkStack, RelayNode};
pub use transport::Libp2pStack;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Identity, transport or multiplexer construction failed. Always fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("No listen address configured")]
    NoListenAddresses,
    #[error("Invalid listen address {addr:?}: {reason}")]
    InvalidListenAddress { addr: String, reason: String },
    #[error("Listen address {addr} is not supported by the {transport} transport")]
    UnsupportedAddress { addr: String, transport: TransportKind },
    #[error("Identity error: {0}")]
    Identity(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Behaviour error: {0}")]
    Behaviour(String),
    #[error("Failed to listen on {addr}: {reason}")]
    Listen { addr: String, reason: String },
    #[error("Bind timeout must be at least one second")]
    ZeroBindTimeout,
    #[error("Listeners not bound after {0}s")]
    BindTimeout(u64),
    #[error("Node has no bound listen address")]
    NoBoundAddresses,
}

/// Relay serving could not be attached. The node keeps running without it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayActivationError {
    #[error("Relay serving is already active")]
    AlreadyActive,
    #[error("Node is not running")]
    NodeUnavailable,
    #[error("Relay refused: {0}")]
    Refused(String),
}

/// The node's network task is gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Node task not running")]
    Unavailable,
    #[error("No reply from node task")]
    NoReply,
}

/// Startup aborted before the node reached the running state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("Relay serving is required but could not be activated: {0}")]
    RelayRequired(#[source] RelayActivationError),
}
