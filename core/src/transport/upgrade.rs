// Transport construction
//
// One base transport per node, plus the relay client transport when relay
// client support is on. Every output is boxed to (PeerId, StreamMuxerBox) so
// the swarm type does not depend on the configured transport or multiplexer.

use crate::config::{Multiplexer, TransportKind};
use crate::BootstrapError;
use futures::future::Either;
use futures::{AsyncRead, AsyncWrite};
use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::{Boxed, OptionalTransport};
use libp2p::core::upgrade::Version;
use libp2p::identity::Keypair;
use libp2p::{noise, quic, relay, tcp, yamux, PeerId, Transport};

pub type NodeTransport = Boxed<(PeerId, StreamMuxerBox)>;

/// Build the node's transport stack.
///
/// TCP and relayed connections are secured with noise and multiplexed with
/// `multiplexer`. QUIC and WebRTC-direct connections are natively
/// multiplexed.
pub fn build_transport(
    keypair: &Keypair,
    kind: TransportKind,
    multiplexer: Multiplexer,
    relay_client: Option<relay::client::Transport>,
) -> Result<NodeTransport, BootstrapError> {
    if kind.is_natively_multiplexed() {
        tracing::debug!(
            "{} multiplexes natively, {} applies to relayed connections only",
            kind,
            multiplexer
        );
    }

    let relayed = match relay_client {
        Some(transport) => OptionalTransport::some(transport),
        None => OptionalTransport::none(),
    };

    match kind {
        TransportKind::Tcp => {
            let tcp = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
            secure_and_multiplex(relayed.or_transport(tcp), keypair, multiplexer)
        }
        TransportKind::Quic => {
            let quic = quic::tokio::Transport::new(quic::Config::new(keypair))
                .map(|(peer, connection), _| (peer, StreamMuxerBox::new(connection)));
            let relayed = secure_and_multiplex(relayed, keypair, multiplexer)?;
            Ok(join(relayed, quic))
        }
        TransportKind::WebrtcDirect => {
            let certificate =
                libp2p_webrtc::tokio::Certificate::generate(&mut rand::thread_rng())
                    .map_err(|e| BootstrapError::Transport(format!("WebRTC certificate: {}", e)))?;
            let webrtc = libp2p_webrtc::tokio::Transport::new(keypair.clone(), certificate)
                .map(|(peer, connection), _| (peer, StreamMuxerBox::new(connection)));
            let relayed = secure_and_multiplex(relayed, keypair, multiplexer)?;
            Ok(join(relayed, webrtc))
        }
    }
}

/// Noise handshake, then the configured multiplexer
fn secure_and_multiplex<T>(
    transport: T,
    keypair: &Keypair,
    multiplexer: Multiplexer,
) -> Result<NodeTransport, BootstrapError>
where
    T: Transport + Send + Unpin + 'static,
    T::Output: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
    T::Dial: Send + 'static,
    T::ListenerUpgrade: Send + 'static,
{
    let noise = noise::Config::new(keypair)
        .map_err(|e| BootstrapError::Transport(format!("noise: {}", e)))?;
    let authenticated = transport.upgrade(Version::V1).authenticate(noise);

    let transport = match multiplexer {
        Multiplexer::Yamux => authenticated
            .multiplex(yamux::Config::default())
            .map(|(peer, muxer), _| (peer, StreamMuxerBox::new(muxer)))
            .boxed(),
        Multiplexer::Mplex => authenticated
            .multiplex(libp2p_mplex::MplexConfig::default())
            .map(|(peer, muxer), _| (peer, StreamMuxerBox::new(muxer)))
            .boxed(),
    };

    Ok(transport)
}

/// Relayed addresses go to the relay client, everything else to `native`
fn join<T>(relayed: NodeTransport, native: T) -> NodeTransport
where
    T: Transport<Output = (PeerId, StreamMuxerBox)> + Send + Unpin + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
    T::Dial: Send + 'static,
    T::ListenerUpgrade: Send + 'static,
{
    relayed
        .or_transport(native)
        .map(|either, _| match either {
            Either::Left(output) => output,
            Either::Right(output) => output,
        })
        .boxed()
}
