//! Home Assistant MQTT discovery documents

use serde::Serialize;

use super::reporter::Topics;
use super::Component;

/// Device block shared by all components of one authbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

/// Discovery document for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDescriptor {
    /// Home Assistant integration (`binary_sensor`, `sensor`)
    #[serde(skip)]
    pub kind: &'static str,
    #[serde(skip)]
    pub object_id: &'static str,
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub availability_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<&'static str>,
    pub icon: &'static str,
    pub device: DiscoveryDevice,
}

impl DiscoveryDescriptor {
    pub fn new(component: Component, topics: &Topics) -> Self {
        let hostname = topics.hostname();
        let device = DiscoveryDevice {
            identifiers: vec![format!("authbox_{}", hostname)],
            name: format!("Authbox {}", hostname),
            manufacturer: "authbox",
            model: "badge-gated power switch",
        };
        let object_id = component.object_id();

        let (kind, name, device_class, binary, icon) = match component {
            Component::Relay => ("binary_sensor", "Relay", Some("power"), true, "mdi:power-plug"),
            Component::Badge => ("sensor", "Badge", None, false, "mdi:badge-account"),
            Component::CurrentSensor => (
                "binary_sensor",
                "Current sensing",
                Some("running"),
                true,
                "mdi:current-ac",
            ),
        };

        Self {
            kind,
            object_id,
            name: format!("{} on {}", name, hostname),
            unique_id: format!("authbox_{}_{}", hostname, object_id),
            state_topic: topics.state(component),
            availability_topic: topics.availability(),
            device_class,
            payload_on: binary.then_some("ON"),
            payload_off: binary.then_some("OFF"),
            icon,
            device,
        }
    }

    /// Retained topic the document is published on
    pub fn config_topic(&self, hostname: &str) -> String {
        format!(
            "homeassistant/{}/{}/{}/config",
            self.kind, hostname, self.object_id
        )
    }
}
