//! Utility modules for authbox
//!
//! This module contains common utilities used across the codebase.

pub mod deadline;
pub mod throttle;

pub use deadline::Deadline;
pub use throttle::LogThrottler;
