// Node identity: keypair plus derived peer ID
//
// A fresh Ed25519 identity is generated on every start unless the operator
// supplies a keypair file. The file is only ever read.

use crate::BootstrapError;
use libp2p::identity::Keypair;
use libp2p::PeerId;
use std::path::Path;

/// Process-local network identity, immutable once created
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Generate a new random Ed25519 identity
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::generate_ed25519())
    }

    /// Wrap an existing keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self { keypair, peer_id }
    }

    /// Read a protobuf-encoded keypair supplied by the operator
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            BootstrapError::Identity(format!("cannot read {}: {}", path.display(), e))
        })?;
        let keypair = Keypair::from_protobuf_encoding(&bytes).map_err(|e| {
            BootstrapError::Identity(format!("cannot decode {}: {}", path.display(), e))
        })?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Consume the identity, handing the keypair to the network stack
    pub fn into_keypair(self) -> Keypair {
        self.keypair
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_fresh_each_time() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        assert_ne!(a.peer_id(), b.peer_id());
        assert_eq!(a.peer_id(), a.keypair().public().to_peer_id());
    }

    #[test]
    fn test_supplied_keypair_file() {
        let keypair = Keypair::generate_ed25519();
        let expected = keypair.public().to_peer_id();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, keypair.to_protobuf_encoding().unwrap()).unwrap();

        let identity = NodeIdentity::from_file(&path).unwrap();
        assert_eq!(identity.peer_id(), expected);
    }

    #[test]
    fn test_corrupt_keypair_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        assert!(matches!(
            NodeIdentity::from_file(&path),
            Err(BootstrapError::Identity(_))
        ));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let identity = NodeIdentity::generate();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(&identity.peer_id().to_string()));
        assert!(!debug.contains("keypair"));
    }
}
