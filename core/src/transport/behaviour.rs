// Combined NetworkBehaviour for the relay node
//
// - relay: circuit relay server, attached after bootstrap
// - relay_client: lets our own connections traverse other relays
// - identify: tells peers which addresses they are seen on
// - ping: keeps idle relayed connections alive

use crate::config::RelaySettings;
use crate::RelayActivationError;
use libp2p::{
    identify, ping, relay,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
    PeerId,
};
use std::time::Duration;

/// Identify protocol version advertised to peers
pub const IDENTIFY_PROTOCOL: &str = "/relaynode/1.0.0";

#[derive(NetworkBehaviour)]
pub struct RelayNodeBehaviour {
    /// Relay server; disabled until the activator attaches it
    pub relay: Toggle<relay::Behaviour>,
    /// Relay client, present when relay-client support is configured
    pub relay_client: Toggle<relay::client::Behaviour>,
    /// Peer identification
    pub identify: identify::Behaviour,
    /// Liveness
    pub ping: ping::Behaviour,
}

impl RelayNodeBehaviour {
    /// Create the behaviour without relay serving
    pub fn new(
        keypair: &libp2p::identity::Keypair,
        relay_client: Option<relay::client::Behaviour>,
    ) -> Self {
        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
                .with_push_listen_addr_updates(true)
                .with_interval(Duration::from_secs(60)),
        );

        Self {
            relay: Toggle::from(None),
            relay_client: Toggle::from(relay_client),
            identify,
            ping: ping::Behaviour::default(),
        }
    }

    /// Attach the relay server. Connections established afterwards can
    /// reserve slots and open circuits through this node.
    pub fn attach_relay(
        &mut self,
        local_peer_id: PeerId,
        settings: &RelaySettings,
    ) -> Result<(), RelayActivationError> {
        if self.relay.is_enabled() {
            return Err(RelayActivationError::AlreadyActive);
        }

        let config = relay_config(settings)?;
        self.relay = Toggle::from(Some(relay::Behaviour::new(local_peer_id, config)));
        Ok(())
    }
}

/// Relay server config from settings. Reservation and circuit limits keep
/// the libp2p defaults.
pub fn relay_config(settings: &RelaySettings) -> Result<relay::Config, RelayActivationError> {
    if settings.max_circuit_duration_secs == 0 {
        return Err(RelayActivationError::Refused(
            "max circuit duration must be positive".to_string(),
        ));
    }

    Ok(relay::Config {
        max_circuit_duration: Duration::from_secs(settings.max_circuit_duration_secs),
        ..relay::Config::default()
    })
}
