//! rumqttc-backed reporter

use parking_lot::Mutex;
use reqwest::Url;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reporter::{Publication, ReporterState, Topics};
use super::{Component, StatePublisher};
use crate::config::MqttConfig;
use crate::error::{AppError, Result};
use crate::events::{BrokerEvent, EventSender, InputEvent};
use crate::utils::LogThrottler;

/// Default broker port when the URL does not name one
pub const DEFAULT_PORT: u16 = 1883;

/// Delay between reconnect attempts
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Pending request capacity between the client handle and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Split a `mqtt://host[:port]` or `tcp://host[:port]` broker URL
pub fn parse_broker(broker: &str) -> Result<(String, u16)> {
    let url = Url::parse(broker)
        .map_err(|e| AppError::Config(format!("invalid broker URL '{}': {}", broker, e)))?;

    match url.scheme() {
        "mqtt" | "tcp" => {}
        other => {
            return Err(AppError::Config(format!(
                "unsupported broker scheme '{}' (expected mqtt or tcp)",
                other
            )))
        }
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| AppError::Config(format!("broker URL '{}' has no host", broker)))?;

    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_PORT)))
}

/// State reporter holding one persistent broker connection
pub struct MqttReporter {
    client: AsyncClient,
    state: Arc<Mutex<ReporterState>>,
    throttler: Arc<LogThrottler>,
}

impl MqttReporter {
    /// Configure the client and start its event loop task
    ///
    /// Connectivity transitions are reported on `events`. Connection failures
    /// are never fatal; the loop keeps retrying.
    pub fn start(
        config: &MqttConfig,
        hostname: &str,
        events: EventSender,
    ) -> Result<(Arc<Self>, JoinHandle<()>)> {
        let (host, port) = parse_broker(&config.broker)?;
        let state = ReporterState::new(Topics::new(&config.topic, hostname));
        let will = state.last_will();

        let mut options = MqttOptions::new(format!("authbox/{}", hostname), host.clone(), port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_last_will(LastWill::new(
            will.topic,
            will.payload,
            QoS::AtLeastOnce,
            will.retain,
        ));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let reporter = Arc::new(Self {
            client,
            state: Arc::new(Mutex::new(state)),
            throttler: Arc::new(LogThrottler::with_secs(30)),
        });

        info!("Reporting to MQTT broker {}:{} as authbox/{}", host, port, hostname);
        let task = tokio::spawn(run_event_loop(eventloop, reporter.clone(), events));
        Ok((reporter, task))
    }

    fn send(&self, publication: Publication) {
        let topic = publication.topic;
        if let Err(e) = self.client.try_publish(
            topic.as_str(),
            QoS::AtLeastOnce,
            publication.retain,
            publication.payload,
        ) {
            if self.throttler.should_log("publish") {
                warn!("Failed to queue MQTT publish on {}: {}", topic, e);
            }
        }
    }
}

impl StatePublisher for MqttReporter {
    fn publish(&self, component: Component, value: String) {
        // Lock held across the enqueue so values stay ordered against a reconnect flush
        let mut state = self.state.lock();
        if let Some(publication) = state.record(component, value) {
            self.send(publication);
        }
    }
}

async fn run_event_loop(mut eventloop: EventLoop, reporter: Arc<MqttReporter>, events: EventSender) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("MQTT connected ({:?})", ack.code);
                reporter.throttler.clear("poll");

                let was_connected = {
                    let mut state = reporter.state.lock();
                    let was_connected = state.is_connected();
                    for publication in state.on_connected() {
                        reporter.send(publication);
                    }
                    was_connected
                };

                if !was_connected
                    && events
                        .send(InputEvent::from(BrokerEvent::Connected))
                        .await
                        .is_err()
                {
                    break;
                }
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                let transitioned = reporter.state.lock().on_disconnected();
                if reporter.throttler.should_log("poll") {
                    warn!("MQTT connection error: {}", e);
                }
                if transitioned {
                    let event = BrokerEvent::Disconnected {
                        reason: e.to_string(),
                    };
                    if events.send(InputEvent::from(event)).await.is_err() {
                        break;
                    }
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }

    debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[test]
    fn test_parse_broker() {
        assert_eq!(
            parse_broker("mqtt://broker.shop").unwrap(),
            ("broker.shop".to_string(), 1883)
        );
        assert_eq!(
            parse_broker("tcp://10.0.0.5:1884").unwrap(),
            ("10.0.0.5".to_string(), 1884)
        );
    }

    #[test]
    fn test_parse_broker_rejects_bad_urls() {
        assert!(parse_broker("http://broker.shop").is_err());
        assert!(parse_broker("broker.shop").is_err());
        assert!(parse_broker("mqtt://").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_broker_is_not_fatal() {
        let config = MqttConfig {
            broker: "mqtt://127.0.0.1:1".to_string(),
            topic: "workshop".to_string(),
        };
        let (tx, mut rx) = events::channel();
        let (reporter, task) = MqttReporter::start(&config, "lathe", tx).unwrap();

        // Never connected, so no disconnect transition is reported
        reporter.publish(Component::Relay, "OFF".to_string());
        tokio::time::sleep(RETRY_INTERVAL * 3).await;
        assert!(rx.try_recv().is_err());
        assert!(!task.is_finished());
        assert!(!reporter.state.lock().is_connected());
    }
}
