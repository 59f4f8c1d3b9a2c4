//! Power relay sink

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gpio::OutputPin;
use crate::utils::LogThrottler;

/// Command side of the relay sink
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<bool>,
}

impl RelayHandle {
    /// Handle whose commands land on `tx`, for driving the relay without a pin
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<bool>) -> Self {
        Self { tx }
    }

    /// Queue a relay command; commands are applied in order
    pub fn set_power(&self, on: bool) {
        if self.tx.send(on).is_err() {
            warn!("Relay sink has stopped, dropping command (on={})", on);
        }
    }
}

/// Start the relay writer task
///
/// After every write the task waits `settle` before taking the next command
/// so the contacts are never toggled faster than they can follow.
pub fn spawn_relay<P: OutputPin>(pin: P, settle: Duration) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_relay(pin, settle, rx));
    (RelayHandle::from_sender(tx), task)
}

async fn run_relay<P: OutputPin>(
    mut pin: P,
    settle: Duration,
    mut commands: mpsc::UnboundedReceiver<bool>,
) {
    let throttler = LogThrottler::default();

    while let Some(on) = commands.recv().await {
        match pin.set(on) {
            Ok(()) => {
                debug!("Relay {}", if on { "on" } else { "off" });
                throttler.clear("relay");
            }
            Err(e) => {
                if throttler.should_log("relay") {
                    warn!("Relay write failed: {}", e);
                }
            }
        }
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
    }

    debug!("Relay sink stopped");
}
