//! Badge scan tokenizer
//!
//! Rebuilds badge identifiers from the key presses typed by the reader.
//! A scan ends with Enter; a scan that stalls longer than the inter-key
//! timeout is abandoned by the driving task calling [`BadgeDecoder::abandon`].

use evdev::Key;

use super::keymap;

/// Accumulates key presses into badge identifiers
#[derive(Debug, Default)]
pub struct BadgeDecoder {
    buffer: String,
    capitalize: bool,
}

impl BadgeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key press; returns the identifier when a scan completes
    pub fn push(&mut self, key: Key) -> Option<String> {
        if keymap::is_shift(key) {
            self.capitalize = true;
            return None;
        }

        if keymap::is_enter(key) {
            self.capitalize = false;
            if self.buffer.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.buffer));
        }

        if let Some(c) = keymap::key_char(key, self.capitalize) {
            self.buffer.push(c);
        }
        self.capitalize = false;
        None
    }

    /// Whether a partial scan is in progress
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty() || self.capitalize
    }

    /// Drop a partial scan; returns how many characters were discarded
    pub fn abandon(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.capitalize = false;
        dropped
    }
}
