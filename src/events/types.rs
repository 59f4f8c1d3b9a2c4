//! Input event types
//!
//! Every hardware or network producer reports to the orchestrator with one
//! of these events.

use serde::{Deserialize, Serialize};

/// A completed badge scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeScanEvent {
    /// Badge identifier as typed by the reader
    pub id: String,
}

/// A debounced transition of the current sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLevelEvent {
    /// Whether the machine is drawing current
    pub high: bool,
}

/// Broker connectivity transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// Connection (re-)established
    Connected,
    /// Connection lost or attempt failed
    Disconnected {
        /// Human-readable cause
        reason: String,
    },
}

/// Everything the orchestrator consumes from outside sources, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Badge(BadgeScanEvent),
    PowerLevel(PowerLevelEvent),
    Broker(BrokerEvent),
}

impl From<BadgeScanEvent> for InputEvent {
    fn from(event: BadgeScanEvent) -> Self {
        Self::Badge(event)
    }
}

impl From<PowerLevelEvent> for InputEvent {
    fn from(event: PowerLevelEvent) -> Self {
        Self::PowerLevel(event)
    }
}

impl From<BrokerEvent> for InputEvent {
    fn from(event: BrokerEvent) -> Self {
        Self::Broker(event)
    }
}
