//! GPIO output lines

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::debug;

use super::{line_value, CONSUMER};
use crate::error::{AppError, Result};

/// A physical on/off output
///
/// Each output has exactly one owner, the sink task driving it.
pub trait OutputPin: Send + 'static {
    /// Drive the output to the logical state `on`
    fn set(&mut self, on: bool) -> Result<()>;
}

/// Output line on a GPIO chip
pub struct GpioOutput {
    handle: LineHandle,
    pin: u32,
    active_low: bool,
}

impl GpioOutput {
    /// Request `pin` as an output, starting in the inactive state
    pub fn request(chip: &mut Chip, pin: u32, active_low: bool) -> Result<Self> {
        let line = chip
            .get_line(pin)
            .map_err(|e| AppError::gpio(pin, format!("line lookup failed: {}", e)))?;

        let handle = line
            .request(LineRequestFlags::OUTPUT, line_value(false, active_low), CONSUMER)
            .map_err(|e| AppError::gpio(pin, format!("output request failed: {}", e)))?;

        debug!("GPIO pin {} configured as output (active_low: {})", pin, active_low);
        Ok(Self {
            handle,
            pin,
            active_low,
        })
    }
}

impl OutputPin for GpioOutput {
    fn set(&mut self, on: bool) -> Result<()> {
        self.handle
            .set_value(line_value(on, self.active_low))
            .map_err(|e| AppError::gpio(self.pin, format!("set failed: {}", e)))
    }
}

impl Drop for GpioOutput {
    fn drop(&mut self) {
        // Leave the line inactive when released
        let _ = self.handle.set_value(line_value(false, self.active_low));
    }
}
