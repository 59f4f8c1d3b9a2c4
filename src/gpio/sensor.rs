//! Current sensing input
//!
//! The current sensor closes a contact while the machine draws power.
//! The kernel debounces the line, and edges are settled again in software:
//! after the last edge the line must stay quiet for the debounce period
//! before its level is read and, if it differs from the last report,
//! forwarded as a power level event.

use async_trait::async_trait;
use gpiocdev::line::{self, EdgeDetection, Value};
use gpiocdev::tokio::AsyncRequest;
use gpiocdev::Request;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::CONSUMER;
use crate::config::{Bias, CurrentSensingConfig};
use crate::error::{AppError, Result};
use crate::events::{EventSender, InputEvent, PowerLevelEvent};
use crate::utils::Deadline;

/// A binary input delivering edge notifications
#[async_trait]
pub trait LevelInput: Send {
    /// Wait for the next edge; `None` once the line is gone
    async fn next_edge(&mut self) -> Option<Result<()>>;

    /// Current logical level
    fn level(&self) -> Result<bool>;
}

/// Line bias to request; `None` leaves the pin controller setting alone
pub(crate) fn line_bias(bias: Bias) -> Option<line::Bias> {
    match bias {
        Bias::AsIs => None,
        Bias::PullUp => Some(line::Bias::PullUp),
        Bias::PullDown => Some(line::Bias::PullDown),
        Bias::Disabled => Some(line::Bias::Disabled),
    }
}

/// Current sensing line on a GPIO chip
///
/// Requested through the v2 character device ABI, which carries bias,
/// active-low and kernel-side debounce in the line request.
pub struct GpioLevelInput {
    request: AsyncRequest,
    pin: u32,
}

impl GpioLevelInput {
    /// Request the current sensing line on `chip` for both-edge events
    pub fn request(chip: &Path, config: &CurrentSensingConfig) -> Result<Self> {
        let pin = config.pin;
        let mut builder = Request::builder();
        builder
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .with_line(pin)
            .as_input()
            .with_bias(line_bias(config.bias))
            .with_edge_detection(EdgeDetection::BothEdges)
            .with_debounce_period(config.debounce());
        if config.active_low {
            builder.as_active_low();
        }

        let request = builder
            .request()
            .map_err(|e| AppError::gpio(pin, format!("event request failed: {}", e)))?;

        debug!(
            "GPIO pin {} configured as input (bias: {:?}, active_low: {})",
            pin, config.bias, config.active_low
        );
        Ok(Self {
            request: AsyncRequest::new(request),
            pin,
        })
    }
}

#[async_trait]
impl LevelInput for GpioLevelInput {
    async fn next_edge(&mut self) -> Option<Result<()>> {
        let pin = self.pin;
        Some(
            self.request
                .read_edge_event()
                .await
                .map(|_| ())
                .map_err(|e| AppError::gpio(pin, e)),
        )
    }

    fn level(&self) -> Result<bool> {
        let value = self
            .request
            .as_ref()
            .value(self.pin)
            .map_err(|e| AppError::gpio(self.pin, format!("read failed: {}", e)))?;
        Ok(value == Value::Active)
    }
}

/// Forward debounced level changes of `input` until the line or the channel closes
///
/// The level at startup is reported once so subscribers start from a known
/// value.
pub async fn watch_level<L: LevelInput>(mut input: L, debounce: Duration, events: EventSender) {
    let mut last = match input.level() {
        Ok(level) => {
            let event = InputEvent::from(PowerLevelEvent { high: level });
            if events.send(event).await.is_err() {
                return;
            }
            Some(level)
        }
        Err(e) => {
            warn!("Initial current sensing read failed: {}", e);
            None
        }
    };
    let mut settle = Deadline::new();

    loop {
        tokio::select! {
            edge = input.next_edge() => match edge {
                Some(Ok(())) => settle.arm(debounce),
                Some(Err(e)) => {
                    warn!("Current sensing edge error: {}", e);
                    settle.arm(debounce);
                }
                None => {
                    warn!("Current sensing line closed");
                    break;
                }
            },
            _ = settle.expired() => {
                settle.disarm();
                match input.level() {
                    Ok(level) if Some(level) != last => {
                        debug!("Current sensing level settled: high={}", level);
                        last = Some(level);
                        let event = InputEvent::from(PowerLevelEvent { high: level });
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Current sensing read failed: {}", e),
                }
            }
        }
    }
}
