//! Log throttling utility
//!
//! Hardware write failures and broker reconnect attempts repeat at a fixed
//! pace while the fault lasts; this keeps them from flooding the journal.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits how often the same message key is logged
///
/// # Example
///
/// ```rust
/// use authbox::utils::LogThrottler;
///
/// let throttler = LogThrottler::with_secs(30);
/// assert!(throttler.should_log("mqtt_poll"));
/// assert!(!throttler.should_log("mqtt_poll"));
/// ```
pub struct LogThrottler {
    last_logged: Mutex<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` (and records the time) if `key` was not logged within the interval
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_logged.lock();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Forget `key` so the next occurrence is logged right away
    ///
    /// Call this when the fault condition recovers.
    pub fn clear(&self, key: &str) {
        self.last_logged.lock().remove(key);
    }
}

impl Default for LogThrottler {
    fn default() -> Self {
        Self::with_secs(5)
    }
}
