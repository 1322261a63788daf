// Lifecycle controller: Running → ShuttingDown
//
// The wait is a single-shot oneshot channel: the first termination request
// wins, anything after it is never observed. Teardown closes every listener
// and stops the node task with no drain period.

use crate::stack::RelayNode;
use std::fmt;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    /// Terminal
    ShuttingDown,
}

/// Why the node is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested programmatically, or the signal source went away
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::Terminate => write!(f, "terminate"),
            ShutdownReason::Requested => write!(f, "requested"),
        }
    }
}

/// What teardown did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Listeners open right before shutdown, all closed now
    pub listeners_closed: usize,
    pub relay_was_serving: bool,
}

/// Sending half of a shutdown signal. Firing consumes it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: oneshot::Sender<ShutdownReason>,
}

impl ShutdownTrigger {
    pub fn fire(self, reason: ShutdownReason) {
        // Receiver gone means shutdown is already under way
        let _ = self.tx.send(reason);
    }
}

/// Receiving half: resolves once, on the first termination request
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: oneshot::Receiver<ShutdownReason>,
}

impl ShutdownSignal {
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = oneshot::channel();
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    /// Watch for SIGINT and SIGTERM. Must be called inside a tokio runtime.
    ///
    /// Handlers are installed before this returns, so a signal arriving during
    /// startup is held until the controller waits for it.
    #[cfg(unix)]
    pub fn from_os() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let (trigger, shutdown) = Self::channel();

        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = interrupt.recv() => ShutdownReason::Interrupt,
                _ = terminate.recv() => ShutdownReason::Terminate,
            };
            tracing::debug!("Received {} signal", reason);
            trigger.fire(reason);
        });

        Ok(shutdown)
    }

    /// Watch for Ctrl+C. Must be called inside a tokio runtime.
    #[cfg(not(unix))]
    pub fn from_os() -> std::io::Result<Self> {
        let (trigger, shutdown) = Self::channel();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => trigger.fire(ShutdownReason::Interrupt),
                Err(e) => {
                    tracing::error!("Cannot listen for Ctrl+C: {}", e);
                    // Hold the trigger so the node is not stopped by accident
                    let _trigger = trigger;
                    futures::future::pending::<()>().await;
                }
            }
        });

        Ok(shutdown)
    }

    /// Block until the first termination request
    pub async fn wait(self) -> ShutdownReason {
        match self.rx.await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::debug!("Shutdown trigger dropped");
                ShutdownReason::Requested
            }
        }
    }
}

/// Owns the node from the moment it is running until it is destroyed
pub struct Controller<N: RelayNode> {
    node: N,
    state: LifecycleState,
}

impl<N: RelayNode> Controller<N> {
    /// Take ownership of a running node
    pub fn new(node: N) -> Self {
        Self {
            node,
            state: LifecycleState::Running,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Wait for the signal and move to ShuttingDown
    pub async fn wait_for_shutdown(&mut self, signal: ShutdownSignal) -> ShutdownReason {
        let reason = signal.wait().await;
        self.state = LifecycleState::ShuttingDown;
        tracing::info!("Shutting down ({})", reason);
        reason
    }

    /// Destroy the node: close listeners, drop relay state, stop the task
    pub async fn shutdown(self, reason: ShutdownReason) -> ShutdownReport {
        let relay_was_serving = self.node.is_relaying();

        let listeners_closed = match self.node.close().await {
            Ok(closed) => closed,
            Err(e) => {
                tracing::warn!("Node already stopped: {}", e);
                0
            }
        };

        tracing::info!(listeners_closed, relay_was_serving, "Node stopped");

        ShutdownReport {
            reason,
            listeners_closed,
            relay_was_serving,
        }
    }

    /// Block until shutdown is requested, then tear the node down
    pub async fn run_until(mut self, signal: ShutdownSignal) -> ShutdownReport {
        let reason = self.wait_for_shutdown(signal).await;
        self.shutdown(reason).await
    }
}
