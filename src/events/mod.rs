//! Event plumbing between producers and the orchestrator
//!
//! All producers (badge reader, current sensor, broker notifier) share one
//! ordered channel so the orchestrator handles events strictly in arrival
//! order across sources.

pub mod types;

pub use types::{BadgeScanEvent, BrokerEvent, InputEvent, PowerLevelEvent};

use tokio::sync::mpsc;

/// Input channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Producer side of the input channel
pub type EventSender = mpsc::Sender<InputEvent>;

/// Consumer side of the input channel, owned by the orchestrator
pub type EventReceiver = mpsc::Receiver<InputEvent>;

/// Create the orchestrator input channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_keep_arrival_order() {
        let (tx, mut rx) = channel();
        let badge = tx.clone();

        badge
            .send(BadgeScanEvent { id: "ABC".to_string() }.into())
            .await
            .unwrap();
        tx.send(PowerLevelEvent { high: true }.into()).await.unwrap();
        tx.send(BrokerEvent::Connected.into()).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(InputEvent::Badge(BadgeScanEvent {
                id: "ABC".to_string()
            }))
        );
        assert_eq!(
            rx.recv().await,
            Some(InputEvent::PowerLevel(PowerLevelEvent { high: true }))
        );
        assert_eq!(rx.recv().await, Some(InputEvent::Broker(BrokerEvent::Connected)));
    }

    #[test]
    fn test_broker_event_serialization() {
        let json = serde_json::to_string(&BrokerEvent::Disconnected {
            reason: "connection refused".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"disconnected","reason":"connection refused"}"#
        );
    }
}
