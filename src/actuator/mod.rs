//! Actuator and indicator sinks
//!
//! Each physical output (relay, green LED, red LED) has exactly one writer
//! task. The orchestrator only talks to them through cloneable handles, so
//! writes to a line are serialized and never block the state machine.

mod indicator;
mod relay;

pub use indicator::{spawn_indicator, IndicatorHandle, IndicatorMode};
pub use relay::{spawn_relay, RelayHandle};
