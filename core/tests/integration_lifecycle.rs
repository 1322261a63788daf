//! Startup-to-shutdown tests against the fake network stack
//!
//! These tests drive the full sequence the binary runs:
//! 1. Bootstrap
//! 2. Relay activation
//! 3. Address report
//! 4. Wait for the shutdown signal
//! 5. Teardown
//!
//! Run with: cargo test --test integration_lifecycle

use libp2p::Multiaddr;
use relaynode_core::runner::READY_PROMPT;
use relaynode_core::testing::{FakeStack, FAKE_BASE_PORT};
use relaynode_core::{
    activate_relay, advertised_addresses, bootstrap, run, BootstrapError, Controller,
    LifecycleState, NodeConfig, RelayActivationError, RelayStatus, ShutdownReason, ShutdownSignal,
    StartupError, TransportKind,
};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn single_listener() -> NodeConfig {
    NodeConfig {
        listen_addresses: vec!["/ip4/0.0.0.0/udp/0/webrtc-direct".to_string()],
        transport: TransportKind::WebrtcDirect,
        ..NodeConfig::default()
    }
}

#[tokio::test]
async fn test_one_listener_gives_one_address_line() {
    init_tracing();
    let stack = FakeStack::new();
    let (trigger, signal) = ShutdownSignal::channel();
    trigger.fire(ShutdownReason::Interrupt);

    let mut out = Vec::new();
    let report = run(&stack, &single_listener(), &mut out, signal).await.unwrap();

    let peer_id = stack.state().peer_id.expect("node was created");
    let expected = format!(
        "p2p addr: [/ip4/0.0.0.0/udp/{}/webrtc-direct/p2p/{}]",
        FAKE_BASE_PORT, peer_id
    );

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, format!("{}\n{}\n", expected, READY_PROMPT));
    assert_eq!(report.listeners_closed, 1);
}

#[tokio::test]
async fn test_bind_failure_stops_before_relay_and_report() {
    init_tracing();
    let stack = FakeStack::new().fail_bootstrap("address family not supported");
    let (_trigger, signal) = ShutdownSignal::channel();

    let mut out = Vec::new();
    let result = run(&stack, &single_listener(), &mut out, signal).await;

    match result {
        Err(StartupError::Bootstrap(BootstrapError::Listen { reason, .. })) => {
            assert!(reason.contains("address family"));
        }
        other => panic!("expected bootstrap failure, got {:?}", other),
    }

    assert!(out.is_empty());
    assert_eq!(stack.state().nodes_created, 0);
    assert_eq!(stack.state().relay_attempts, 0);
}

#[tokio::test]
async fn test_relay_failure_still_runs_and_exits_cleanly() {
    init_tracing();
    let stack = FakeStack::new().fail_relay(RelayActivationError::Refused(
        "relay protocol unavailable".to_string(),
    ));
    let (trigger, signal) = ShutdownSignal::channel();

    let config = single_listener();
    let mut out = Vec::new();

    let task = tokio::spawn(async move {
        let result = run(&stack, &config, &mut out, signal).await;
        (result, out, stack)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished(), "node must keep running until signalled");

    trigger.fire(ShutdownReason::Terminate);
    let (result, out, stack) = task.await.unwrap();

    let report = result.expect("relay failure is not fatal");
    assert_eq!(report.reason, ShutdownReason::Terminate);
    assert!(!report.relay_was_serving);
    assert_eq!(stack.state().relay_attempts, 1);

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("p2p addr: [/ip4/"));
    assert!(text.ends_with(&format!("{}\n", READY_PROMPT)));
}

#[tokio::test]
async fn test_signal_closes_every_listener() {
    init_tracing();
    let stack = FakeStack::new();
    let config = NodeConfig {
        listen_addresses: vec![
            "/ip4/0.0.0.0/tcp/0".to_string(),
            "/ip6/::/tcp/0".to_string(),
            "/ip4/127.0.0.1/tcp/4001".to_string(),
        ],
        transport: TransportKind::Tcp,
        ..NodeConfig::default()
    };

    let mut node = bootstrap(&stack, &config).await.unwrap();
    assert!(activate_relay(&mut node, &config.relay).await.is_serving());
    assert_eq!(stack.state().listeners.len(), 3);

    let mut controller = Controller::new(node);
    let (trigger, signal) = ShutdownSignal::channel();
    trigger.fire(ShutdownReason::Interrupt);

    let reason = controller.wait_for_shutdown(signal).await;
    assert_eq!(controller.state(), LifecycleState::ShuttingDown);

    let report = controller.shutdown(reason).await;
    assert_eq!(report.listeners_closed, 3);
    assert!(report.relay_was_serving);
    assert!(stack.state().listeners.is_empty());
    assert!(!stack.state().relaying);
}

#[tokio::test]
async fn test_addresses_are_read_at_call_time() {
    init_tracing();
    let stack = FakeStack::new();
    let node = bootstrap(&stack, &single_listener()).await.unwrap();

    assert_eq!(advertised_addresses(&node).await.len(), 1);

    let discovered: Multiaddr = "/ip4/203.0.113.7/udp/9090/webrtc-direct".parse().unwrap();
    stack.push_listen_address(discovered);

    let addrs = advertised_addresses(&node).await;
    assert_eq!(addrs.len(), 2);
    assert!(addrs[1].to_string().starts_with("/ip4/203.0.113.7/udp/9090/webrtc-direct/p2p/"));
}

#[tokio::test]
async fn test_relay_failure_does_not_change_bootstrap() {
    init_tracing();
    let stack = FakeStack::new().fail_relay(RelayActivationError::NodeUnavailable);
    let mut node = bootstrap(&stack, &single_listener()).await.unwrap();

    let status = activate_relay(&mut node, &single_listener().relay).await;
    assert_eq!(status, RelayStatus::Unavailable(RelayActivationError::NodeUnavailable));

    assert_eq!(advertised_addresses(&node).await.len(), 1);
    assert!(!stack.state().closed);
}
