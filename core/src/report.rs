// Address reporter
//
// Joins the peer ID with every current listen address and prints the result
// on one operator-facing line. Nothing is cached; each call reads the node.

use crate::stack::RelayNode;
use libp2p::{Multiaddr, PeerId};
use std::io::Write;

/// Compose dialable addresses. Addresses that already name a different peer
/// are dropped.
pub fn compose_addresses(peer_id: PeerId, listen: Vec<Multiaddr>) -> Vec<Multiaddr> {
    listen
        .into_iter()
        .filter_map(|addr| match addr.with_p2p(peer_id) {
            Ok(full) => Some(full),
            Err(addr) => {
                tracing::debug!("Skipping {}: bound to another peer", addr);
                None
            }
        })
        .collect()
}

/// Current advertised addresses of `node`
pub async fn advertised_addresses<N: RelayNode>(node: &N) -> Vec<Multiaddr> {
    match node.listen_addresses().await {
        Ok(listen) => compose_addresses(node.peer_id(), listen),
        Err(e) => {
            tracing::warn!("Could not read listen addresses: {}", e);
            Vec::new()
        }
    }
}

pub fn format_address_line(addrs: &[Multiaddr]) -> String {
    let joined = addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("p2p addr: [{}]", joined)
}

/// Write the address line to `out` and return what was written.
pub async fn report_addresses<N: RelayNode, W: Write>(node: &N, out: &mut W) -> Vec<Multiaddr> {
    let addrs = advertised_addresses(node).await;

    if let Err(e) = writeln!(out, "{}", format_address_line(&addrs)).and_then(|_| out.flush()) {
        tracing::warn!("Could not print addresses: {}", e);
    }

    addrs
}
