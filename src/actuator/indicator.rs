//! Status LED sink

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gpio::OutputPin;
use crate::utils::{Deadline, LogThrottler};

/// Display mode of a status LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndicatorMode {
    /// Steady on or off
    Static { on: bool },
    /// Start off, then invert every `interval`
    Blink {
        #[serde(with = "millis")]
        interval: Duration,
    },
}

impl IndicatorMode {
    pub const OFF: Self = Self::Static { on: false };
    pub const ON: Self = Self::Static { on: true };

    pub fn blink(interval: Duration) -> Self {
        Self::Blink { interval }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Command side of an indicator sink
#[derive(Clone)]
pub struct IndicatorHandle {
    name: &'static str,
    tx: mpsc::UnboundedSender<IndicatorMode>,
}

impl IndicatorHandle {
    pub(crate) fn from_sender(name: &'static str, tx: mpsc::UnboundedSender<IndicatorMode>) -> Self {
        Self { name, tx }
    }

    /// Switch the LED to `mode`, superseding any previous mode
    pub fn set_mode(&self, mode: IndicatorMode) {
        if self.tx.send(mode).is_err() {
            warn!("{} LED sink has stopped, dropping {:?}", self.name, mode);
        }
    }
}

/// Start the writer task for one LED
pub fn spawn_indicator<P: OutputPin>(
    name: &'static str,
    pin: P,
) -> (IndicatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_indicator(name, pin, rx));
    (IndicatorHandle::from_sender(name, tx), task)
}

async fn run_indicator<P: OutputPin>(
    name: &'static str,
    mut pin: P,
    mut modes: mpsc::UnboundedReceiver<IndicatorMode>,
) {
    let throttler = LogThrottler::default();
    let mut write = |on: bool| match pin.set(on) {
        Ok(()) => throttler.clear(name),
        Err(e) => {
            if throttler.should_log(name) {
                warn!("{} LED write failed: {}", name, e);
            }
        }
    };

    let mut tick = Deadline::new();
    let mut interval = Duration::ZERO;
    let mut lit = false;

    loop {
        tokio::select! {
            mode = modes.recv() => {
                let Some(mode) = mode else { break };
                debug!("{} LED -> {:?}", name, mode);
                match mode {
                    IndicatorMode::Static { on } => {
                        tick.disarm();
                        lit = on;
                    }
                    IndicatorMode::Blink { interval: every } => {
                        interval = every;
                        lit = false;
                        tick.arm(interval);
                    }
                }
                write(lit);
            }
            _ = tick.expired() => {
                lit = !lit;
                write(lit);
                tick.arm(interval);
            }
        }
    }

    debug!("{} LED sink stopped", name);
}
