//! MQTT state reporting
//!
//! Publishes relay, badge and current sensing state for dashboards, with
//! Home Assistant discovery documents and a retained availability topic.
//!
//! The broker connection is best effort: while disconnected, values are only
//! cached, and the latest value of each component is re-sent once every time
//! the connection comes back.

mod client;
mod discovery;
mod reporter;

pub use client::{parse_broker, MqttReporter};
pub use discovery::{DiscoveryDescriptor, DiscoveryDevice};
pub use reporter::{Publication, ReporterState, Topics};

use serde::{Deserialize, Serialize};

/// Reported device components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Relay,
    Badge,
    CurrentSensor,
}

impl Component {
    /// All components, in publication order
    pub const ALL: [Component; 3] = [Component::Relay, Component::Badge, Component::CurrentSensor];

    /// Topic suffix under the device prefix, also used as discovery object id
    pub fn object_id(&self) -> &'static str {
        match self {
            Component::Relay => "relay",
            Component::Badge => "badge",
            Component::CurrentSensor => "current",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Component::Relay => 0,
            Component::Badge => 1,
            Component::CurrentSensor => 2,
        }
    }
}

/// ON/OFF payload for binary components
pub fn on_off(on: bool) -> String {
    if on { "ON" } else { "OFF" }.to_string()
}

/// Sink for component state values
///
/// `publish` never blocks; delivery is best effort.
pub trait StatePublisher: Send + Sync {
    fn publish(&self, component: Component, value: String);
}

/// Publisher used when no broker is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl StatePublisher for NoopPublisher {
    fn publish(&self, component: Component, value: String) {
        tracing::trace!("No broker configured, not publishing {:?}={}", component, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_are_unique() {
        let mut ids: Vec<_> = Component::ALL.iter().map(|c| c.object_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), Component::ALL.len());
    }

    #[test]
    fn test_on_off() {
        assert_eq!(on_off(true), "ON");
        assert_eq!(on_off(false), "OFF");
    }
}
