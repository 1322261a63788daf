// libp2p swarm: the actual running relay node
//
// The swarm lives in a spawned task. Libp2pNode is a handle that talks to it
// over a command channel; every query is answered from live swarm state.

use super::behaviour::{RelayNodeBehaviour, RelayNodeBehaviourEvent};
use super::upgrade::build_transport;
use crate::config::{NodeConfig, RelaySettings};
use crate::identity::NodeIdentity;
use crate::stack::{NetworkStack, RelayNode};
use crate::{BootstrapError, NodeError, RelayActivationError};
use async_trait::async_trait;
use libp2p::futures::StreamExt;
use libp2p::{
    core::transport::ListenerId, identify, multiaddr::Protocol, relay, swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Commands that can be sent to the node task
#[derive(Debug)]
pub enum NodeCommand {
    /// Current listen addresses, read from the swarm
    ListenAddresses { reply: mpsc::Sender<Vec<Multiaddr>> },
    /// Attach the relay server behaviour
    AttachRelay {
        settings: RelaySettings,
        reply: mpsc::Sender<Result<(), RelayActivationError>>,
    },
    /// Close every listener and stop the task. Replies with the number of
    /// listeners closed.
    Shutdown { reply: mpsc::Sender<usize> },
}

/// libp2p implementation of [`NetworkStack`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Libp2pStack;

#[async_trait]
impl NetworkStack for Libp2pStack {
    type Node = Libp2pNode;

    async fn create_node(
        &self,
        identity: NodeIdentity,
        config: &NodeConfig,
    ) -> Result<Libp2pNode, BootstrapError> {
        let patterns = config.listen_multiaddrs()?;
        let announce = config.announce_multiaddrs()?;
        let peer_id = identity.peer_id();

        let (relay_transport, relay_client) = if config.relay_client {
            let (transport, behaviour) = relay::client::new(peer_id);
            (Some(transport), Some(behaviour))
        } else {
            (None, None)
        };

        let transport_kind = config.transport;
        let multiplexer = config.multiplexer;
        let idle_timeout = Duration::from_secs(config.idle_connection_timeout_secs);

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(identity.into_keypair())
            .with_tokio()
            .with_other_transport(|key| {
                build_transport(key, transport_kind, multiplexer, relay_transport)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| BootstrapError::Transport(e.to_string()))?
            .with_behaviour(|key| RelayNodeBehaviour::new(key, relay_client))
            .map_err(|e| BootstrapError::Behaviour(e.to_string()))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let mut pending = HashMap::new();
        for pattern in patterns {
            let listener_id = swarm.listen_on(pattern.clone()).map_err(|e| {
                BootstrapError::Listen {
                    addr: pattern.to_string(),
                    reason: e.to_string(),
                }
            })?;
            pending.insert(listener_id, pattern);
        }
        let listeners: HashSet<ListenerId> = pending.keys().copied().collect();

        wait_for_listeners(
            &mut swarm,
            pending,
            Duration::from_secs(config.bind_timeout_secs),
        )
        .await?;

        for addr in announce {
            tracing::info!("Announcing {}", addr);
            swarm.add_external_address(addr);
        }

        let (command_tx, command_rx) = mpsc::channel::<NodeCommand>(32);
        let task = tokio::spawn(run_node(swarm, listeners, command_rx));

        Ok(Libp2pNode {
            peer_id,
            relaying: false,
            command_tx,
            task,
        })
    }
}

/// Handle to a running libp2p relay node
pub struct Libp2pNode {
    peer_id: PeerId,
    relaying: bool,
    command_tx: mpsc::Sender<NodeCommand>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Libp2pNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libp2pNode")
            .field("peer_id", &self.peer_id)
            .field("relaying", &self.relaying)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RelayNode for Libp2pNode {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn listen_addresses(&self) -> Result<Vec<Multiaddr>, NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::ListenAddresses { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable)?;

        reply_rx.recv().await.ok_or(NodeError::NoReply)
    }

    async fn attach_relay(&mut self, settings: &RelaySettings) -> Result<(), RelayActivationError> {
        if self.relaying {
            return Err(RelayActivationError::AlreadyActive);
        }

        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::AttachRelay {
                settings: settings.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RelayActivationError::NodeUnavailable)?;

        reply_rx
            .recv()
            .await
            .ok_or(RelayActivationError::NodeUnavailable)??;

        self.relaying = true;
        Ok(())
    }

    fn is_relaying(&self) -> bool {
        self.relaying
    }

    async fn close(self) -> Result<usize, NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable)?;

        let closed = reply_rx.recv().await.ok_or(NodeError::NoReply)?;

        if let Err(e) = self.task.await {
            tracing::warn!("Node task ended abnormally: {}", e);
        }

        Ok(closed)
    }
}

/// Poll the swarm until every listener reported an address
async fn wait_for_listeners(
    swarm: &mut Swarm<RelayNodeBehaviour>,
    mut pending: HashMap<ListenerId, Multiaddr>,
    timeout: Duration,
) -> Result<(), BootstrapError> {
    let bind = async {
        while !pending.is_empty() {
            match swarm.select_next_some().await {
                SwarmEvent::NewListenAddr {
                    listener_id,
                    address,
                } => {
                    tracing::debug!("Bound {}", address);
                    register_bound_address(swarm, &address);
                    pending.remove(&listener_id);
                }
                SwarmEvent::ListenerError { listener_id, error } => {
                    if let Some(addr) = pending.remove(&listener_id) {
                        return Err(BootstrapError::Listen {
                            addr: addr.to_string(),
                            reason: error.to_string(),
                        });
                    }
                }
                SwarmEvent::ListenerClosed {
                    listener_id,
                    reason,
                    ..
                } => {
                    if let Some(addr) = pending.remove(&listener_id) {
                        let reason = match reason {
                            Ok(()) => "listener closed".to_string(),
                            Err(e) => e.to_string(),
                        };
                        return Err(BootstrapError::Listen {
                            addr: addr.to_string(),
                            reason,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    };

    tokio::time::timeout(timeout, bind)
        .await
        .map_err(|_| BootstrapError::BindTimeout(timeout.as_secs()))?
}

/// Swarm event loop
async fn run_node(
    mut swarm: Swarm<RelayNodeBehaviour>,
    mut listeners: HashSet<ListenerId>,
    mut command_rx: mpsc::Receiver<NodeCommand>,
) {
    loop {
        tokio::select! {
            event = swarm.select_next_some() => {
                handle_event(&mut swarm, &mut listeners, event);
            }

            command = command_rx.recv() => {
                match command {
                    Some(NodeCommand::ListenAddresses { reply }) => {
                        let addrs: Vec<Multiaddr> = swarm.listeners().cloned().collect();
                        let _ = reply.send(addrs).await;
                    }
                    Some(NodeCommand::AttachRelay { settings, reply }) => {
                        let local_peer_id = *swarm.local_peer_id();
                        let result = swarm.behaviour_mut().attach_relay(local_peer_id, &settings);
                        if result.is_ok() {
                            replay_external_addresses(&mut swarm);
                        }
                        let _ = reply.send(result).await;
                    }
                    Some(NodeCommand::Shutdown { reply }) => {
                        let closed = close_listeners(&mut swarm, &mut listeners);
                        let _ = reply.send(closed).await;
                        break;
                    }
                    None => {
                        tracing::debug!("All node handles dropped, stopping");
                        close_listeners(&mut swarm, &mut listeners);
                        break;
                    }
                }
            }
        }
    }
}

/// Whether a bound address names a concrete host other peers can dial
fn is_specific_address(addr: &Multiaddr) -> bool {
    match addr.iter().next() {
        Some(Protocol::Ip4(ip)) => !ip.is_unspecified(),
        Some(Protocol::Ip6(ip)) => !ip.is_unspecified(),
        Some(_) => true,
        None => false,
    }
}

/// Our own bound addresses are the external addresses relay reservations
/// hand out. Peer-observed addresses stay candidates inside identify.
fn register_bound_address(swarm: &mut Swarm<RelayNodeBehaviour>, address: &Multiaddr) {
    if is_specific_address(address) {
        swarm.add_external_address(address.clone());
    }
}

/// The relay behaviour only learns external addresses while it is attached,
/// so confirm the current set again once it is.
fn replay_external_addresses(swarm: &mut Swarm<RelayNodeBehaviour>) {
    let addrs: Vec<Multiaddr> = swarm.external_addresses().cloned().collect();
    for addr in addrs {
        swarm.remove_external_address(&addr);
        swarm.add_external_address(addr);
    }
}

fn close_listeners(
    swarm: &mut Swarm<RelayNodeBehaviour>,
    listeners: &mut HashSet<ListenerId>,
) -> usize {
    listeners
        .drain()
        .filter(|listener_id| swarm.remove_listener(*listener_id))
        .count()
}

fn handle_event(
    swarm: &mut Swarm<RelayNodeBehaviour>,
    listeners: &mut HashSet<ListenerId>,
    event: SwarmEvent<RelayNodeBehaviourEvent>,
) {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            tracing::info!("Listening on {}", address);
            register_bound_address(swarm, &address);
        }
        SwarmEvent::ExpiredListenAddr { address, .. } => {
            tracing::debug!("Listen address expired: {}", address);
            swarm.remove_external_address(&address);
        }
        SwarmEvent::ListenerClosed {
            listener_id,
            addresses,
            reason,
        } => {
            listeners.remove(&listener_id);
            tracing::warn!("Listener on {:?} closed: {:?}", addresses, reason);
        }
        SwarmEvent::ListenerError { error, .. } => {
            tracing::warn!("Listener error: {}", error);
        }
        SwarmEvent::ConnectionEstablished {
            peer_id, endpoint, ..
        } => {
            tracing::debug!("Connected to {} via {}", peer_id, endpoint.get_remote_address());
        }
        SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
            tracing::debug!("Disconnected from {}: {:?}", peer_id, cause);
        }
        SwarmEvent::Behaviour(RelayNodeBehaviourEvent::Identify(identify::Event::Received {
            peer_id,
            info,
            ..
        })) => {
            tracing::debug!("{} observes us at {}", peer_id, info.observed_addr);
        }
        SwarmEvent::Behaviour(RelayNodeBehaviourEvent::Relay(event)) => match event {
            relay::Event::ReservationReqAccepted { src_peer_id, .. } => {
                tracing::info!("Reservation accepted for {}", src_peer_id);
            }
            relay::Event::CircuitReqAccepted {
                src_peer_id,
                dst_peer_id,
                ..
            } => {
                tracing::info!("Circuit opened {} -> {}", src_peer_id, dst_peer_id);
            }
            relay::Event::CircuitClosed {
                src_peer_id,
                dst_peer_id,
                ..
            } => {
                tracing::info!("Circuit closed {} -> {}", src_peer_id, dst_peer_id);
            }
            other => {
                tracing::debug!("Relay: {:?}", other);
            }
        },
        SwarmEvent::Behaviour(RelayNodeBehaviourEvent::RelayClient(event)) => {
            tracing::debug!("Relay client: {:?}", event);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;

    fn tcp_config() -> NodeConfig {
        NodeConfig {
            listen_addresses: vec!["/ip4/127.0.0.1/tcp/0".to_string()],
            transport: TransportKind::Tcp,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_listen_addresses_reflect_bound_port() {
        let node = Libp2pStack
            .create_node(NodeIdentity::generate(), &tcp_config())
            .await
            .unwrap();

        let addrs = node.listen_addresses().await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert!(addrs[0].to_string().starts_with("/ip4/127.0.0.1/tcp/"));
        assert!(!addrs[0].to_string().ends_with("/tcp/0"));

        assert_eq!(node.close().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_attach_relay_twice() {
        let mut node = Libp2pStack
            .create_node(NodeIdentity::generate(), &tcp_config())
            .await
            .unwrap();

        node.attach_relay(&RelaySettings::default()).await.unwrap();
        assert!(node.is_relaying());
        assert_eq!(
            node.attach_relay(&RelaySettings::default()).await,
            Err(RelayActivationError::AlreadyActive)
        );

        node.close().await.unwrap();
    }

    #[test]
    fn test_wildcard_addresses_are_not_external() {
        let wildcard4: Multiaddr = "/ip4/0.0.0.0/tcp/4001".parse().unwrap();
        let wildcard6: Multiaddr = "/ip6/::/udp/4001/quic-v1".parse().unwrap();
        let loopback: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        let lan: Multiaddr = "/ip4/192.168.1.20/udp/4001/webrtc-direct".parse().unwrap();
        let dns: Multiaddr = "/dns4/relay.example.com/tcp/443".parse().unwrap();

        assert!(!is_specific_address(&wildcard4));
        assert!(!is_specific_address(&wildcard6));
        assert!(is_specific_address(&loopback));
        assert!(is_specific_address(&lan));
        assert!(is_specific_address(&dns));
        assert!(!is_specific_address(&Multiaddr::empty()));
    }

    #[tokio::test]
    async fn test_peer_id_matches_identity() {
        let identity = NodeIdentity::generate();
        let expected = identity.peer_id();
        let node = Libp2pStack.create_node(identity, &tcp_config()).await.unwrap();

        assert_eq!(node.peer_id(), expected);
        node.close().await.unwrap();
    }
}
