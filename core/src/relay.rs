//! Relay activator
//!
//! Attaches relay serving to a bootstrapped node. Failure is reported, never
//! escalated: a node that cannot relay still exists and stays reachable.

use crate::config::RelaySettings;
use crate::stack::RelayNode;
use crate::RelayActivationError;

/// Outcome of the single activation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// The node forwards circuits for other peers
    Serving,
    /// Running as a plain peer
    Unavailable(RelayActivationError),
}

impl RelayStatus {
    pub fn is_serving(&self) -> bool {
        matches!(self, RelayStatus::Serving)
    }
}

/// Attach relay serving to `node`. Call once per node.
pub async fn activate_relay<N: RelayNode>(node: &mut N, settings: &RelaySettings) -> RelayStatus {
    match node.attach_relay(settings).await {
        Ok(()) => {
            tracing::info!(
                peer_id = %node.peer_id(),
                max_circuit_duration_secs = settings.max_circuit_duration_secs,
                "Relay serving active"
            );
            RelayStatus::Serving
        }
        Err(e) => {
            tracing::warn!("Failed to instantiate the relay: {}. Continuing as a plain peer", e);
            RelayStatus::Unavailable(e)
        }
    }
}
