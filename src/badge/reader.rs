//! Badge reader input device
//!
//! Finds the keyboard-emulating reader through evdev, grabs it so scans do
//! not leak to a console, and turns its key presses into badge scan events.

use evdev::{Device, InputEventKind, Key};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::BadgeDecoder;
use crate::config::{BadgeReaderConfig, BadgeReaderMatch};
use crate::error::{AppError, Result};
use crate::events::{BadgeScanEvent, EventSender, InputEvent};
use crate::utils::Deadline;

/// Key press buffer between the device pump and the decoder
const KEY_CHANNEL_CAPACITY: usize = 64;

/// evdev key event value for a press; 0 is a release, 2 an autorepeat
const KEY_PRESSED: i32 = 1;

/// An opened and grabbed badge reader
pub struct BadgeReader {
    device: Device,
    path: PathBuf,
    timeout: Duration,
}

impl BadgeReader {
    /// Find the configured reader among the input devices and grab it
    pub fn open(config: &BadgeReaderConfig) -> Result<Self> {
        let matcher = config.matcher()?;
        let (path, mut device) = find_device(&matcher)?;

        device.grab().map_err(|e| {
            AppError::BadgeReader(format!("cannot grab {}: {}", path.display(), e))
        })?;

        info!(
            "Badge reader {:?} opened at {}",
            device.name().unwrap_or("unnamed"),
            path.display()
        );

        Ok(Self {
            device,
            path,
            timeout: config.timeout(),
        })
    }

    /// Start reading scans into the orchestrator input channel
    pub fn spawn(self, events: EventSender) -> Result<JoinHandle<()>> {
        let mut stream = self.device.into_event_stream().map_err(|e| {
            AppError::BadgeReader(format!("cannot stream {}: {}", self.path.display(), e))
        })?;
        let (key_tx, key_rx) = mpsc::channel(KEY_CHANNEL_CAPACITY);
        let path = self.path;

        tokio::spawn(async move {
            loop {
                let event = match stream.next_event().await {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Badge reader {} read failed: {}", path.display(), e);
                        break;
                    }
                };
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                if !is_press(event.value()) {
                    continue;
                }
                if key_tx.send(key).await.is_err() {
                    break;
                }
            }
        });

        Ok(tokio::spawn(decode_scans(key_rx, self.timeout, events)))
    }
}

fn is_press(value: i32) -> bool {
    value == KEY_PRESSED
}

/// Locate the reader by name or vendor/product
fn find_device(matcher: &BadgeReaderMatch) -> Result<(PathBuf, Device)> {
    let mut seen = 0usize;
    for (path, device) in evdev::enumerate() {
        seen += 1;
        let found = match matcher {
            BadgeReaderMatch::Name(name) => device.name() == Some(name.as_str()),
            BadgeReaderMatch::Id { vendor, product } => {
                let id = device.input_id();
                id.vendor() == *vendor && id.product() == *product
            }
        };
        if found {
            return Ok((path, device));
        }
    }

    Err(AppError::BadgeReader(format!(
        "no badge reader matching {:?} amongst {} input devices",
        matcher, seen
    )))
}

/// Decode key presses into scans until either side of the pipeline closes
///
/// The inter-key deadline is re-armed after every key that leaves a scan
/// pending; on expiry the partial scan is dropped without emitting.
pub async fn decode_scans(
    mut keys: mpsc::Receiver<Key>,
    timeout: Duration,
    events: EventSender,
) {
    let mut decoder = BadgeDecoder::new();
    let mut deadline = Deadline::new();

    loop {
        tokio::select! {
            key = keys.recv() => {
                let Some(key) = key else {
                    debug!("Badge key stream closed");
                    break;
                };
                if let Some(id) = decoder.push(key) {
                    debug!("Badge scanned: {}", id);
                    if events.send(InputEvent::from(BadgeScanEvent { id })).await.is_err() {
                        break;
                    }
                }
                if decoder.is_pending() {
                    deadline.arm(timeout);
                } else {
                    deadline.disarm();
                }
            }
            _ = deadline.expired() => {
                deadline.disarm();
                let dropped = decoder.abandon();
                if dropped > 0 {
                    debug!("Discarded partial badge scan ({} characters)", dropped);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::decoder::tests::keys_for;
    use crate::events;

    const TIMEOUT: Duration = Duration::from_millis(250);

    async fn type_keys(tx: &mpsc::Sender<Key>, keys: &[Key]) {
        for key in keys {
            tx.send(*key).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_only_presses_are_decoded() {
        assert!(is_press(1));
        assert!(!is_press(0));
        assert!(!is_press(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_is_emitted() {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = events::channel();
        tokio::spawn(decode_scans(key_rx, TIMEOUT, event_tx));

        let mut keys = keys_for("ABC12");
        keys.push(Key::KEY_ENTER);
        type_keys(&key_tx, &keys).await;

        assert_eq!(
            event_rx.recv().await,
            Some(InputEvent::Badge(BadgeScanEvent {
                id: "ABC12".to_string()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_scan_is_dropped() {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = events::channel();
        tokio::spawn(decode_scans(key_rx, TIMEOUT, event_tx));

        type_keys(&key_tx, &keys_for("ABC12")).await;
        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(event_rx.try_recv().is_err());

        // The stale characters must not prefix the next scan
        let mut keys = keys_for("9z");
        keys.push(Key::KEY_ENTER);
        type_keys(&key_tx, &keys).await;
        assert_eq!(
            event_rx.recv().await,
            Some(InputEvent::Badge(BadgeScanEvent {
                id: "9z".to_string()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_but_steady_scan_survives() {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = events::channel();
        tokio::spawn(decode_scans(key_rx, TIMEOUT, event_tx));

        let mut keys = keys_for("abc");
        keys.push(Key::KEY_ENTER);
        for key in keys {
            key_tx.send(key).await.unwrap();
            tokio::time::sleep(TIMEOUT - Duration::from_millis(50)).await;
        }

        assert_eq!(
            event_rx.recv().await,
            Some(InputEvent::Badge(BadgeScanEvent {
                id: "abc".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_stops_when_keys_close() {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = events::channel();
        let handle = tokio::spawn(decode_scans(key_rx, TIMEOUT, event_tx));

        drop(key_tx);
        tokio_test::assert_ok!(handle.await);
    }
}
