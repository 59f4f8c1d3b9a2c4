use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::auth::UrlTemplate;
use crate::error::{AppError, Result};

/// GPIO chip label prefix of the Raspberry Pi pin controller
pub const DEFAULT_GPIO_CHIP_LABEL: &str = "pinctrl-bcm2";

fn default_gpio_chip_label() -> String {
    DEFAULT_GPIO_CHIP_LABEL.to_string()
}

fn default_badge_timeout_ms() -> u64 {
    250
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_sensing_debounce_ms() -> u64 {
    100
}

/// Per-device configuration document served by command & control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthboxConfig {
    /// Badge reader (keyboard-emulating HID device)
    pub badge_reader: BadgeReaderConfig,
    /// Remote badge authorization
    pub badge_auth: BadgeAuthConfig,
    /// Power relay output
    pub relay: RelayConfig,
    /// Current sensing input
    pub current_sensing: CurrentSensingConfig,
    /// Green status LED
    #[serde(alias = "led_green")]
    pub green_led: LedConfig,
    /// Red status LED
    #[serde(alias = "led_red")]
    pub red_led: LedConfig,
    /// MQTT reporting (disabled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttConfig>,
    /// Authorized-but-unused time before power is cut
    pub idle_duration_s: u32,
    /// Label prefix used to find the GPIO chip
    #[serde(default = "default_gpio_chip_label")]
    pub gpio_chip_label: String,
}

/// How the badge reader input device is identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeReaderMatch {
    /// Match on the input device name
    Name(String),
    /// Match on the USB vendor/product pair
    Id { vendor: u16, product: u16 },
}

/// Badge reader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BadgeReaderConfig {
    /// Input device name (e.g. "HID OMNIKEY 5427 CK")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// USB vendor ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<u16>,
    /// USB product ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<u16>,
    /// Inter-keystroke timeout delimiting a scan
    #[serde(default = "default_badge_timeout_ms")]
    pub timeout_ms: u64,
}

impl BadgeReaderConfig {
    /// Resolve how the reader should be looked up; the name wins when both are given
    pub fn matcher(&self) -> Result<BadgeReaderMatch> {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return Ok(BadgeReaderMatch::Name(name.clone()));
        }
        match (self.vendor, self.product) {
            (Some(vendor), Some(product)) => Ok(BadgeReaderMatch::Id { vendor, product }),
            _ => Err(AppError::Config(
                "badge_reader needs either a name or both vendor and product".to_string(),
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Badge authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BadgeAuthConfig {
    /// URL template with `{{.badge}}`, `{{.state}}` and `{{.duration}}` placeholders
    pub url_template: String,
    /// Minutes granted per authorization, also the extension period
    pub usage_duration_minutes: u32,
    /// Upper bound on a single authorization call
    #[serde(default = "default_auth_timeout_ms")]
    pub timeout_ms: u64,
}

impl BadgeAuthConfig {
    pub fn usage_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.usage_duration_minutes) * 60)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Power relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// GPIO line offset
    pub pin: u32,
    /// Whether the relay is energized by a low level
    #[serde(default)]
    pub active_low: bool,
    /// Settle time after each switch before the next command is applied
    #[serde(default)]
    pub debounce_ms: u64,
}

/// Line bias requested for the current sensing input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    /// Leave whatever the board configured
    #[default]
    AsIs,
    PullUp,
    PullDown,
    Disabled,
}

/// Current sensing input configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentSensingConfig {
    /// GPIO line offset
    pub pin: u32,
    /// Whether "drawing current" reads as a low level
    #[serde(default)]
    pub active_low: bool,
    /// Quiet period required before a level change is reported
    #[serde(default = "default_sensing_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub bias: Bias,
}

impl CurrentSensingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Status LED configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedConfig {
    /// GPIO line offset
    pub pin: u32,
    #[serde(default)]
    pub active_low: bool,
}

/// MQTT broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttConfig {
    /// Broker URL, e.g. mqtt://control.shop:1883
    pub broker: String,
    /// Topic prefix for state updates
    pub topic: String,
}

impl AuthboxConfig {
    /// Parse a JSON document and validate it
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn idle_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_duration_s))
    }

    /// Check the document for values the device cannot run with
    pub fn validate(&self) -> Result<()> {
        self.badge_reader.matcher()?;

        if self.badge_reader.timeout_ms == 0 {
            return Err(AppError::Config(
                "badge_reader.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.idle_duration_s == 0 {
            return Err(AppError::Config(
                "idle_duration_s must be greater than 0".to_string(),
            ));
        }
        if self.badge_auth.usage_duration_minutes == 0 {
            return Err(AppError::Config(
                "badge_auth.usage_duration_minutes must be greater than 0".to_string(),
            ));
        }
        if self.badge_auth.timeout_ms == 0 {
            return Err(AppError::Config(
                "badge_auth.timeout_ms must be greater than 0".to_string(),
            ));
        }

        UrlTemplate::parse(&self.badge_auth.url_template)?;

        let pins = [
            ("relay", self.relay.pin),
            ("current_sensing", self.current_sensing.pin),
            ("green_led", self.green_led.pin),
            ("red_led", self.red_led.pin),
        ];
        let mut seen = HashSet::new();
        for (name, pin) in pins {
            if !seen.insert(pin) {
                return Err(AppError::Config(format!(
                    "{} pin {} is already used by another line",
                    name, pin
                )));
            }
        }

        if let Some(mqtt) = &self.mqtt {
            crate::mqtt::parse_broker(&mqtt.broker)?;
            if mqtt.topic.trim().is_empty() {
                return Err(AppError::Config("mqtt.topic must not be empty".to_string()));
            }
        }

        Ok(())
    }
}
