//! Deterministic fake network stack for orchestration tests.
//!
//! Every call succeeds or fails exactly as configured, and no socket is
//! opened. Node state is shared with the stack so tests can inspect it after
//! the node has been moved into the code under test.
//!
//! ```rust,ignore
//! let stack = FakeStack::new().fail_relay(RelayActivationError::Refused("hop".into()));
//! let node = bootstrap(&stack, &config).await?;
//! assert!(!stack.state().relaying);
//! ```

use crate::config::{NodeConfig, RelaySettings};
use crate::identity::NodeIdentity;
use crate::stack::{NetworkStack, RelayNode};
use crate::{BootstrapError, NodeError, RelayActivationError};
use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use std::sync::Arc;

/// First port handed out for ephemeral (port 0) patterns
pub const FAKE_BASE_PORT: u16 = 40_000;

/// Snapshot of everything the fake has observed
#[derive(Debug, Clone, Default)]
pub struct FakeState {
    pub nodes_created: usize,
    pub peer_id: Option<PeerId>,
    pub listeners: Vec<Multiaddr>,
    pub relaying: bool,
    pub relay_attempts: usize,
    pub closed: bool,
}

pub struct FakeStack {
    bootstrap_failure: Option<String>,
    relay_failure: Option<RelayActivationError>,
    bind_addresses: bool,
    state: Arc<Mutex<FakeState>>,
}

impl FakeStack {
    /// A stack on which every operation succeeds
    pub fn new() -> Self {
        Self {
            bootstrap_failure: None,
            relay_failure: None,
            bind_addresses: true,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    /// Refuse to bind the first listen pattern
    pub fn fail_bootstrap(mut self, reason: &str) -> Self {
        self.bootstrap_failure = Some(reason.to_string());
        self
    }

    /// Refuse relay attachment with the given error
    pub fn fail_relay(mut self, error: RelayActivationError) -> Self {
        self.relay_failure = Some(error);
        self
    }

    /// Construct nodes that report no listen address at all
    pub fn without_bound_addresses(mut self) -> Self {
        self.bind_addresses = false;
        self
    }

    pub fn state(&self) -> FakeState {
        self.state.lock().clone()
    }

    /// Simulate the transport discovering another address after bootstrap
    pub fn push_listen_address(&self, addr: Multiaddr) {
        self.state.lock().listeners.push(addr);
    }
}

impl Default for FakeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkStack for FakeStack {
    type Node = FakeNode;

    async fn create_node(
        &self,
        identity: NodeIdentity,
        config: &NodeConfig,
    ) -> Result<FakeNode, BootstrapError> {
        let patterns = config.listen_multiaddrs()?;

        if let Some(reason) = &self.bootstrap_failure {
            return Err(BootstrapError::Listen {
                addr: patterns[0].to_string(),
                reason: reason.clone(),
            });
        }

        let mut state = self.state.lock();
        state.nodes_created += 1;
        state.peer_id = Some(identity.peer_id());
        state.closed = false;
        state.relaying = false;
        state.listeners = if self.bind_addresses {
            patterns
                .iter()
                .enumerate()
                .map(|(i, pattern)| bound_address(pattern, i))
                .collect()
        } else {
            Vec::new()
        };

        Ok(FakeNode {
            peer_id: identity.peer_id(),
            relaying: false,
            relay_failure: self.relay_failure.clone(),
            state: self.state.clone(),
        })
    }
}

pub struct FakeNode {
    peer_id: PeerId,
    relaying: bool,
    relay_failure: Option<RelayActivationError>,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl RelayNode for FakeNode {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn listen_addresses(&self) -> Result<Vec<Multiaddr>, NodeError> {
        let state = self.state.lock();
        if state.closed {
            return Err(NodeError::Unavailable);
        }
        Ok(state.listeners.clone())
    }

    async fn attach_relay(&mut self, _settings: &RelaySettings) -> Result<(), RelayActivationError> {
        let mut state = self.state.lock();
        state.relay_attempts += 1;

        if self.relaying {
            return Err(RelayActivationError::AlreadyActive);
        }
        if let Some(error) = &self.relay_failure {
            return Err(error.clone());
        }

        self.relaying = true;
        state.relaying = true;
        Ok(())
    }

    fn is_relaying(&self) -> bool {
        self.relaying
    }

    async fn close(self) -> Result<usize, NodeError> {
        let mut state = self.state.lock();
        let closed = state.listeners.len();
        state.listeners.clear();
        state.relaying = false;
        state.closed = true;
        Ok(closed)
    }
}

/// Replace ephemeral ports with deterministic ones
fn bound_address(pattern: &Multiaddr, index: usize) -> Multiaddr {
    let port = FAKE_BASE_PORT + index as u16;
    pattern
        .iter()
        .map(|protocol| match protocol {
            Protocol::Tcp(0) => Protocol::Tcp(port),
            Protocol::Udp(0) => Protocol::Udp(port),
            other => other,
        })
        .collect()
}
