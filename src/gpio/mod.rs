//! GPIO access
//!
//! Uses the Linux GPIO character device (/dev/gpiochipX) for the relay,
//! the two status LEDs and the current sensing input.
//!
//! # Hardware Support
//!
//! - **Outputs**: relay and LEDs, each with its own active level
//! - **Input**: current sensor with bias, both-edge events, kernel and software debounce

mod output;
mod sensor;

pub use output::{GpioOutput, OutputPin};
pub use sensor::{watch_level, GpioLevelInput, LevelInput};

use gpio_cdev::Chip;
use tracing::debug;

use crate::error::{AppError, Result};

/// Consumer label shown by `gpioinfo` for every requested line
pub const CONSUMER: &str = "authbox";

/// Open the first GPIO chip whose label starts with `label_prefix`
pub fn find_chip(label_prefix: &str) -> Result<Chip> {
    let chips = gpio_cdev::chips()
        .map_err(|e| AppError::Internal(format!("cannot list GPIO chips: {}", e)))?;

    let mut seen = 0usize;
    for chip in chips {
        let chip =
            chip.map_err(|e| AppError::Internal(format!("cannot open GPIO chip: {}", e)))?;
        seen += 1;
        debug!("Found GPIO chip {} ({})", chip.path().display(), chip.label());
        if chip.label().starts_with(label_prefix) {
            return Ok(chip);
        }
    }

    Err(AppError::Internal(format!(
        "no GPIO chip found amongst {} devices with prefix '{}'",
        seen, label_prefix
    )))
}

/// Physical line value for a logical state
pub(crate) fn line_value(on: bool, active_low: bool) -> u8 {
    u8::from(on != active_low)
}
