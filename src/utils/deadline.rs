//! Single-shot deadline usable inside `tokio::select!`

use std::time::Duration;
use tokio::time::Instant;

/// An armable, resettable, stoppable single-shot timer
///
/// The deadline does not run anything by itself: the owner polls
/// [`Deadline::expired`] from its select loop and must call
/// [`Deadline::disarm`] when handling the expiry.
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn new() -> Self {
        Self { at: None }
    }

    /// Arm (or re-arm) the deadline `after` from now
    pub fn arm(&mut self, after: Duration) {
        self.at = Some(Instant::now() + after);
    }

    /// Stop the deadline; a disarmed deadline never fires
    pub fn disarm(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Resolves when the armed instant is reached, never when disarmed
    pub async fn expired(&self) {
        match self.at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
