//! authbox - badge-gated power switch for shared workshop machines
//!
//! A badge scan, confirmed by a remote authority, switches a machine's
//! power relay on. Current sensing tracks whether the machine is actually
//! used, an idle timeout switches it off again, and the state is reported
//! over MQTT for dashboards.

pub mod actuator;
pub mod auth;
pub mod badge;
pub mod config;
pub mod error;
pub mod events;
pub mod gpio;
pub mod liveness;
pub mod mqtt;
pub mod orchestrator;
pub mod supervisor;
pub mod utils;

pub use error::{AppError, Result};
