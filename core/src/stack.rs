//! Collaborator interface to the peer-networking stack
//!
//! The orchestration in `bootstrap`, `relay`, `report` and `lifecycle` only
//! talks to these two traits. [`crate::transport::Libp2pStack`] is the real
//! implementation; `testing::FakeStack` is a deterministic one for tests.

use crate::config::{NodeConfig, RelaySettings};
use crate::identity::NodeIdentity;
use crate::{BootstrapError, NodeError, RelayActivationError};
use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};

/// Builds live nodes
#[async_trait]
pub trait NetworkStack: Send + Sync {
    type Node: RelayNode;

    /// Construct a node with the given identity and bind every listen
    /// pattern in `config`. Returns only once each listener has an address.
    async fn create_node(
        &self,
        identity: NodeIdentity,
        config: &NodeConfig,
    ) -> Result<Self::Node, BootstrapError>;
}

/// A live network endpoint, moved by value from stage to stage
#[async_trait]
pub trait RelayNode: Send + Sized {
    /// Identifier derived from the node's identity
    fn peer_id(&self) -> PeerId;

    /// Listen addresses as the transport reports them right now
    async fn listen_addresses(&self) -> Result<Vec<Multiaddr>, NodeError>;

    /// Start serving as a relay for other peers
    async fn attach_relay(&mut self, settings: &RelaySettings) -> Result<(), RelayActivationError>;

    /// Whether relay serving has been attached
    fn is_relaying(&self) -> bool;

    /// Close every listener and stop the node. Returns how many listeners
    /// were closed.
    async fn close(self) -> Result<usize, NodeError>;
}
