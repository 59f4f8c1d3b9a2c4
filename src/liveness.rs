//! Service manager notifications
//!
//! Readiness and status lines go to systemd through `NOTIFY_SOCKET`. Outside
//! a notify-type unit the socket is absent and every call is a no-op.

use sd_notify::NotifyState;
use tracing::{debug, warn};

/// Signal that devices are initialized and outputs are in their startup state
pub fn notify_ready() {
    send(&[NotifyState::Ready]);
}

/// Replace the status line shown by `systemctl status`
pub fn notify_status(status: &str) {
    send(&[NotifyState::Status(status)]);
}

/// Signal that the service is shutting down
pub fn notify_stopping() {
    send(&[NotifyState::Stopping]);
}

fn send(states: &[NotifyState]) {
    if std::env::var_os("NOTIFY_SOCKET").is_none() {
        debug!("No service manager socket, skipping notification");
        return;
    }
    if let Err(e) = sd_notify::notify(false, states) {
        warn!("Service manager notification failed: {}", e);
    }
}
