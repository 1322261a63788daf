// Identity & transport bootstrap
//
// Produces a live node or a BootstrapError. No retry and no degraded mode:
// if any listener cannot be bound the whole bootstrap fails.

use crate::config::NodeConfig;
use crate::identity::NodeIdentity;
use crate::stack::{NetworkStack, RelayNode};
use crate::BootstrapError;

/// Create the node described by `config` on the given network stack.
///
/// The returned node always has at least one listen address.
pub async fn bootstrap<S: NetworkStack>(
    stack: &S,
    config: &NodeConfig,
) -> Result<S::Node, BootstrapError> {
    // Fail on bad patterns before any socket is opened
    let patterns = config.listen_multiaddrs()?;

    let identity = match &config.identity_file {
        Some(path) => {
            tracing::info!("Using identity from {}", path.display());
            NodeIdentity::from_file(path)?
        }
        None => {
            tracing::info!("Generating a new identity");
            NodeIdentity::generate()
        }
    };

    tracing::info!(
        peer_id = %identity.peer_id(),
        transport = %config.transport,
        multiplexer = %config.multiplexer,
        relay_client = config.relay_client,
        listeners = patterns.len(),
        "Bootstrapping node"
    );

    let node = stack.create_node(identity, config).await?;

    let bound = match node.listen_addresses().await {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::error!("Node stopped during bootstrap: {}", e);
            Vec::new()
        }
    };

    if bound.is_empty() {
        if let Err(e) = node.close().await {
            tracing::debug!("Closing unbound node: {}", e);
        }
        return Err(BootstrapError::NoBoundAddresses);
    }

    for addr in &bound {
        tracing::info!("Listening on {}", addr);
    }

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::testing::FakeStack;

    fn tcp_config(patterns: &[&str]) -> NodeConfig {
        NodeConfig {
            listen_addresses: patterns.iter().map(|p| p.to_string()).collect(),
            transport: TransportKind::Tcp,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_binds_every_pattern() {
        let stack = FakeStack::new();
        let config = tcp_config(&["/ip4/127.0.0.1/tcp/0", "/ip4/0.0.0.0/tcp/0"]);

        let node = bootstrap(&stack, &config).await.expect("bootstrap");
        assert_eq!(node.listen_addresses().await.unwrap().len(), 2);
        assert!(!node.is_relaying());
        assert_eq!(stack.state().nodes_created, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_empty_pattern_list_before_stack() {
        let stack = FakeStack::new();
        let config = tcp_config(&[]);

        let result = bootstrap(&stack, &config).await;
        assert!(matches!(result, Err(BootstrapError::NoListenAddresses)));
        assert_eq!(stack.state().nodes_created, 0);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_zero_bind_timeout_before_stack() {
        let stack = FakeStack::new();
        let config = NodeConfig {
            bind_timeout_secs: 0,
            ..tcp_config(&["/ip4/127.0.0.1/tcp/0"])
        };

        let result = bootstrap(&stack, &config).await;
        assert!(matches!(result, Err(BootstrapError::ZeroBindTimeout)));
        assert_eq!(stack.state().nodes_created, 0);
    }

    #[tokio::test]
    async fn test_bootstrap_propagates_stack_failure() {
        let stack = FakeStack::new().fail_bootstrap("address family not supported");
        let config = tcp_config(&["/ip6/::1/tcp/0"]);

        match bootstrap(&stack, &config).await {
            Err(BootstrapError::Listen { reason, .. }) => {
                assert!(reason.contains("address family"))
            }
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Bootstrap should have failed"),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_never_returns_unbound_node() {
        let stack = FakeStack::new().without_bound_addresses();
        let config = tcp_config(&["/ip4/127.0.0.1/tcp/0"]);

        let result = bootstrap(&stack, &config).await;
        assert!(matches!(result, Err(BootstrapError::NoBoundAddresses)));
        assert!(stack.state().closed);
    }

    #[tokio::test]
    async fn test_bootstrap_with_unreadable_identity_file() {
        let stack = FakeStack::new();
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            identity_file: Some(dir.path().join("missing.key")),
            ..tcp_config(&["/ip4/127.0.0.1/tcp/0"])
        };

        let result = bootstrap(&stack, &config).await;
        assert!(matches!(result, Err(BootstrapError::Identity(_))));
        assert_eq!(stack.state().nodes_created, 0);
    }
}
