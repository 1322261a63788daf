// Transport module: libp2p swarm and networking

pub mod behaviour;
pub mod swarm;
pub mod upgrade;

pub use behaviour::RelayNodeBehaviour;
pub use swarm::{Libp2pNode, Libp2pStack, NodeCommand};
pub use upgrade::{build_transport, NodeTransport};
