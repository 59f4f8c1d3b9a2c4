//! Device configuration
//!
//! The configuration is a JSON document retrieved once at startup and
//! immutable afterwards.

mod loader;
pub(crate) mod schema;

pub use loader::{ConfigLoader, DEFAULT_CONTROL_URL, LOCAL_CONFIG_ENV};
pub use schema::{
    AuthboxConfig, BadgeAuthConfig, BadgeReaderConfig, BadgeReaderMatch, Bias,
    CurrentSensingConfig, LedConfig, MqttConfig, RelayConfig, DEFAULT_GPIO_CHIP_LABEL,
};
