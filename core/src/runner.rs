// Bootstrap → relay → report → wait → shutdown
//
// The node handle is moved through each stage; only the controller destroys
// it. Bootstrap failure aborts before anything else runs. Relay failure
// degrades to a plain peer unless relay serving is required.

use crate::bootstrap::bootstrap;
use crate::config::NodeConfig;
use crate::lifecycle::{Controller, ShutdownReport, ShutdownSignal};
use crate::relay::{activate_relay, RelayStatus};
use crate::report::report_addresses;
use crate::stack::{NetworkStack, RelayNode};
use crate::StartupError;
use std::io::Write;

/// Prompt printed once the node is running
pub const READY_PROMPT: &str = "press Ctrl+C to quit";

/// Run a relay node until `shutdown` fires.
///
/// Operator output (address line and ready prompt) goes to `out`.
pub async fn run<S, W>(
    stack: &S,
    config: &NodeConfig,
    out: &mut W,
    shutdown: ShutdownSignal,
) -> Result<ShutdownReport, StartupError>
where
    S: NetworkStack,
    W: Write,
{
    let mut node = bootstrap(stack, config).await?;

    if let RelayStatus::Unavailable(e) = activate_relay(&mut node, &config.relay).await {
        if config.relay.required {
            tracing::error!("Relay serving is required, aborting");
            if let Err(close_err) = node.close().await {
                tracing::debug!("Closing node: {}", close_err);
            }
            return Err(StartupError::RelayRequired(e));
        }
    }

    report_addresses(&node, out).await;

    if let Err(e) = writeln!(out, "{}", READY_PROMPT).and_then(|_| out.flush()) {
        tracing::warn!("Could not print prompt: {}", e);
    }

    Ok(Controller::new(node).run_until(shutdown).await)
}
