//! Connection-aware publication bookkeeping
//!
//! `ReporterState` decides what goes on the wire and when; it never touches
//! the network itself, which keeps the reconnect behaviour testable.

use tracing::debug;

use super::discovery::DiscoveryDescriptor;
use super::Component;

/// Payloads for the availability topic
pub const AVAILABLE: &str = "online";
pub const UNAVAILABLE: &str = "offline";

/// Topic layout for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
    hostname: String,
}

impl Topics {
    pub fn new(topic: &str, hostname: &str) -> Self {
        Self {
            prefix: format!("{}/{}", topic.trim_end_matches('/'), hostname),
            hostname: hostname.to_string(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self, component: Component) -> String {
        format!("{}/{}", self.prefix, component.object_id())
    }

    pub fn availability(&self) -> String {
        format!("{}/availability", self.prefix)
    }
}

/// A message ready to be handed to the MQTT client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl Publication {
    fn new(topic: String, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic,
            payload: payload.into(),
            retain,
        }
    }
}

/// Last-value cache plus connectivity flag
pub struct ReporterState {
    topics: Topics,
    discovery: Vec<Publication>,
    cache: [Option<String>; 3],
    connected: bool,
}

impl ReporterState {
    pub fn new(topics: Topics) -> Self {
        let discovery = Component::ALL
            .iter()
            .filter_map(|component| {
                let descriptor = DiscoveryDescriptor::new(*component, &topics);
                let payload = serde_json::to_string(&descriptor).ok()?;
                Some(Publication::new(
                    descriptor.config_topic(topics.hostname()),
                    payload,
                    true,
                ))
            })
            .collect();

        Self {
            topics,
            discovery,
            cache: Default::default(),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Retained message the broker publishes if this client vanishes
    pub fn last_will(&self) -> Publication {
        Publication::new(self.topics.availability(), UNAVAILABLE, true)
    }

    /// Cache `value`; returns the publication to send if connected
    pub fn record(&mut self, component: Component, value: String) -> Option<Publication> {
        let publication = self
            .connected
            .then(|| Publication::new(self.topics.state(component), value.as_str(), false));
        if publication.is_none() {
            debug!("Broker disconnected, caching {:?}={}", component, value);
        }
        self.cache[component.index()] = Some(value);
        publication
    }

    /// Everything to send after a (re)connect: discovery, availability, then
    /// each cached value once
    pub fn on_connected(&mut self) -> Vec<Publication> {
        self.connected = true;

        let mut out = self.discovery.clone();
        out.push(Publication::new(self.topics.availability(), AVAILABLE, true));
        for component in Component::ALL {
            if let Some(value) = &self.cache[component.index()] {
                out.push(Publication::new(
                    self.topics.state(component),
                    value.as_str(),
                    false,
                ));
            }
        }
        out
    }

    /// Mark the connection lost; returns whether this is a transition
    pub fn on_disconnected(&mut self) -> bool {
        std::mem::replace(&mut self.connected, false)
    }
}
