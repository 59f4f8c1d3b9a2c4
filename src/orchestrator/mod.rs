//! Orchestrator
//!
//! The single owner of [`MachineState`]. It consumes badge scans, current
//! sensing levels and broker connectivity from one ordered channel, runs the
//! idle, extension and denial deadlines, and drives the relay and LEDs only
//! through their sink handles.
//!
//! # Phases
//!
//! ```text
//!          scan + initial ok           power high
//!   OFF ────────────────────▶ IDLE ──────────────▶ IN_USE
//!    ▲                         │  ◀──────────────
//!    └──── idle deadline ──────┘     power low
//! ```

mod state;

pub use state::{MachineState, Phase};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actuator::{IndicatorHandle, IndicatorMode, RelayHandle};
use crate::auth::{AuthAction, Authorizer};
use crate::config::AuthboxConfig;
use crate::error::AppError;
use crate::events::{BrokerEvent, EventReceiver, InputEvent};
use crate::liveness;
use crate::mqtt::{on_off, Component, StatePublisher};
use crate::utils::Deadline;

/// Fixed LED timings
pub mod timing {
    use std::time::Duration;

    /// Green blink while a session is open but idle
    pub const SESSION_BLINK: Duration = Duration::from_millis(500);

    /// Red blink after a refused badge
    pub const DENIAL_BLINK: Duration = Duration::from_millis(120);

    /// How long the denial blink lasts
    pub const DENIAL_DURATION: Duration = Duration::from_millis(1200);

    /// Period of the status line refresh
    pub const STATUS_REFRESH: Duration = Duration::from_secs(60);
}

/// Session timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Idle time before an open session is closed
    pub idle: Duration,
    /// Period of the extension calls while a session is open
    pub extension: Duration,
    /// Upper bound on the initial authorization call
    pub auth_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn from_config(config: &AuthboxConfig) -> Self {
        Self {
            idle: config.idle_duration(),
            extension: config.badge_auth.usage_duration(),
            auth_timeout: config.badge_auth.timeout(),
        }
    }
}

/// Sink handles for the physical outputs
#[derive(Clone)]
pub struct Outputs {
    pub relay: RelayHandle,
    pub green: IndicatorHandle,
    pub red: IndicatorHandle,
}

/// The machine state orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    state: MachineState,
    outputs: Outputs,
    authorizer: Arc<dyn Authorizer>,
    publisher: Arc<dyn StatePublisher>,
    idle: Deadline,
    extension: Deadline,
    denial: Deadline,
    snapshot: watch::Sender<MachineState>,
    last_status: String,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        outputs: Outputs,
        authorizer: Arc<dyn Authorizer>,
        publisher: Arc<dyn StatePublisher>,
    ) -> Self {
        let state = MachineState::default();
        let (snapshot, _) = watch::channel(state.clone());
        Self {
            config,
            state,
            outputs,
            authorizer,
            publisher,
            idle: Deadline::new(),
            extension: Deadline::new(),
            denial: Deadline::new(),
            snapshot,
            last_status: String::new(),
        }
    }

    /// Follow state snapshots, updated after every handled event
    pub fn subscribe(&self) -> watch::Receiver<MachineState> {
        self.snapshot.subscribe()
    }

    /// Drive the startup outputs, then serve events until shutdown
    pub async fn run(mut self, mut events: EventReceiver, mut shutdown: broadcast::Receiver<()>) {
        self.start();
        liveness::notify_ready();
        info!("Orchestrator ready, {}", self.state);

        let mut refresh = tokio::time::interval_at(
            Instant::now() + timing::STATUS_REFRESH,
            timing::STATUS_REFRESH,
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Orchestrator shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("All event sources closed");
                        break;
                    }
                },
                _ = self.idle.expired() => self.on_idle_expired(),
                _ = self.extension.expired() => self.on_extension_expired(),
                _ = self.denial.expired() => self.on_denial_expired(),
                _ = refresh.tick() => liveness::notify_status(&self.state.to_string()),
            }
            self.commit();
        }

        self.stop();
    }

    /// Startup outputs: relay off, green off, red on
    fn start(&mut self) {
        self.outputs.relay.set_power(false);
        self.outputs.green.set_mode(IndicatorMode::OFF);
        self.outputs.red.set_mode(IndicatorMode::ON);
        self.publish_session();
        self.commit();
    }

    fn stop(&mut self) {
        self.idle.disarm();
        self.extension.disarm();
        self.denial.disarm();
        if self.state.phase != Phase::Off {
            let badge = self.state.close_session();
            info!("Closing session of badge {} on shutdown", badge);
        }
        self.start();
        liveness::notify_stopping();
    }

    /// Handle one input event
    pub async fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Badge(scan) => self.on_badge(scan.id).await,
            InputEvent::PowerLevel(level) => self.on_power(level.high),
            InputEvent::Broker(event) => self.on_broker(event),
        }
    }

    async fn on_badge(&mut self, badge_id: String) {
        if self.state.phase != Phase::Off {
            debug!(
                "Ignoring badge {} while {:?} for {}",
                badge_id, self.state.phase, self.state.badge_id
            );
            return;
        }

        info!("Badge {} scanned, requesting authorization", badge_id);
        let result = tokio::time::timeout(
            self.config.auth_timeout,
            self.authorizer.authorize(&badge_id, AuthAction::Initial),
        )
        .await
        .unwrap_or_else(|_| Err(AppError::AuthTimeout(self.config.auth_timeout.as_millis())));

        match result {
            Ok(()) => {
                info!("Badge {} authorized, powering on", badge_id);
                self.state.open_session(badge_id);
                self.idle.arm(self.config.idle);
                self.extension.arm(self.config.extension);
                self.denial.disarm();
                self.outputs.relay.set_power(true);
                self.outputs
                    .green
                    .set_mode(IndicatorMode::blink(timing::SESSION_BLINK));
                self.outputs.red.set_mode(IndicatorMode::OFF);
                self.publish_session();
            }
            Err(e) => {
                warn!("Badge {} not authorized: {}", badge_id, e);
                self.outputs
                    .red
                    .set_mode(IndicatorMode::blink(timing::DENIAL_BLINK));
                self.denial.arm(timing::DENIAL_DURATION);
            }
        }
    }

    fn on_power(&mut self, high: bool) {
        self.state.current_high = high;
        self.publisher.publish(Component::CurrentSensor, on_off(high));

        match (self.state.phase, high) {
            (Phase::Idle, true) => {
                info!("Machine drawing current, badge {}", self.state.badge_id);
                self.idle.disarm();
                self.state.phase = Phase::InUse;
                self.outputs.green.set_mode(IndicatorMode::ON);
            }
            (Phase::InUse, false) => {
                info!("Machine stopped drawing current, idle timer started");
                self.idle.arm(self.config.idle);
                self.state.phase = Phase::Idle;
                self.outputs
                    .green
                    .set_mode(IndicatorMode::blink(timing::SESSION_BLINK));
            }
            (phase, high) => {
                debug!("Ignoring power level high={} while {:?}", high, phase);
            }
        }
    }

    fn on_broker(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                info!("Broker connected");
                self.state.broker_connected = true;
            }
            BrokerEvent::Disconnected { reason } => {
                warn!("Broker disconnected: {}", reason);
                self.state.broker_connected = false;
            }
        }
    }

    fn on_idle_expired(&mut self) {
        self.idle.disarm();
        if self.state.phase != Phase::Idle {
            debug!("Idle deadline fired while {:?}", self.state.phase);
            return;
        }

        let badge_id = self.state.close_session();
        info!("Idle timeout, powering off session of badge {}", badge_id);
        self.extension.disarm();
        self.outputs.relay.set_power(false);
        self.outputs.green.set_mode(IndicatorMode::OFF);
        self.outputs.red.set_mode(IndicatorMode::ON);
        self.publish_session();
        self.spawn_authorization(badge_id, AuthAction::Return);
    }

    fn on_extension_expired(&mut self) {
        if self.state.phase == Phase::Off {
            self.extension.disarm();
            return;
        }

        self.spawn_authorization(self.state.badge_id.clone(), AuthAction::Extend);
        self.extension.arm(self.config.extension);
    }

    fn on_denial_expired(&mut self) {
        self.denial.disarm();
        self.outputs
            .red
            .set_mode(IndicatorMode::Static {
                on: self.state.phase == Phase::Off,
            });
    }

    /// Informational call; the outcome is only logged
    fn spawn_authorization(&self, badge_id: String, action: AuthAction) {
        let authorizer = self.authorizer.clone();
        tokio::spawn(async move {
            match authorizer.authorize(&badge_id, action).await {
                Ok(()) => info!("Authorization '{}' for badge {} accepted", action, badge_id),
                Err(e) => warn!(
                    "Authorization '{}' for badge {} failed: {}",
                    action, badge_id, e
                ),
            }
        });
    }

    fn publish_session(&self) {
        self.publisher
            .publish(Component::Relay, on_off(self.state.relay_on));
        self.publisher
            .publish(Component::Badge, self.state.badge_id.clone());
    }

    /// Publish the snapshot and push the status line if it changed
    fn commit(&mut self) {
        debug_assert!(self.state.is_consistent(), "inconsistent state {:?}", self.state);
        debug_assert!(self.state.phase == Phase::Idle || !self.idle.is_armed());

        self.snapshot.send_if_modified(|current| {
            let changed = *current != self.state;
            if changed {
                *current = self.state.clone();
            }
            changed
        });

        let status = self.state.to_string();
        if status != self.last_status {
            liveness::notify_status(&status);
            self.last_status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::{self, BadgeScanEvent, EventSender, PowerLevelEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    const CONFIG: OrchestratorConfig = OrchestratorConfig {
        idle: Duration::from_secs(5),
        extension: Duration::from_secs(600),
        auth_timeout: Duration::from_secs(10),
    };

    struct FakeAuthorizer {
        calls: mpsc::UnboundedSender<(String, AuthAction)>,
        denied: HashSet<String>,
        hanging: HashSet<String>,
    }

    #[async_trait]
    impl Authorizer for FakeAuthorizer {
        async fn authorize(&self, badge_id: &str, action: AuthAction) -> Result<()> {
            let _ = self.calls.send((badge_id.to_string(), action));
            if self.hanging.contains(badge_id) {
                std::future::pending::<()>().await;
            }
            if self.denied.contains(badge_id) {
                return Err(AppError::AuthDenied {
                    status: 403,
                    reason: "not trained".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        values: Mutex<Vec<(Component, String)>>,
    }

    impl StatePublisher for RecordingPublisher {
        fn publish(&self, component: Component, value: String) {
            self.values.lock().push((component, value));
        }
    }

    struct Harness {
        events: EventSender,
        calls: mpsc::UnboundedReceiver<(String, AuthAction)>,
        relay: mpsc::UnboundedReceiver<bool>,
        green: mpsc::UnboundedReceiver<IndicatorMode>,
        red: mpsc::UnboundedReceiver<IndicatorMode>,
        publisher: Arc<RecordingPublisher>,
        state: watch::Receiver<MachineState>,
        shutdown: broadcast::Sender<()>,
        task: JoinHandle<()>,
    }

    impl Harness {
        async fn start(denied: &[&str], hanging: &[&str]) -> Self {
            Self::with_config(CONFIG, denied, hanging).await
        }

        async fn with_config(config: OrchestratorConfig, denied: &[&str], hanging: &[&str]) -> Self {
            let (calls_tx, calls) = mpsc::unbounded_channel();
            let (relay_tx, relay) = mpsc::unbounded_channel();
            let (green_tx, green) = mpsc::unbounded_channel();
            let (red_tx, red) = mpsc::unbounded_channel();
            let authorizer = Arc::new(FakeAuthorizer {
                calls: calls_tx,
                denied: denied.iter().map(|s| s.to_string()).collect(),
                hanging: hanging.iter().map(|s| s.to_string()).collect(),
            });
            let publisher = Arc::new(RecordingPublisher::default());
            let outputs = Outputs {
                relay: RelayHandle::from_sender(relay_tx),
                green: IndicatorHandle::from_sender("green", green_tx),
                red: IndicatorHandle::from_sender("red", red_tx),
            };

            let orchestrator = Orchestrator::new(config, outputs, authorizer, publisher.clone());
            let state = orchestrator.subscribe();
            let (events, events_rx) = events::channel();
            let (shutdown, shutdown_rx) = broadcast::channel(1);
            let task = tokio::spawn(orchestrator.run(events_rx, shutdown_rx));

            let mut harness = Self {
                events,
                calls,
                relay,
                green,
                red,
                publisher,
                state,
                shutdown,
                task,
            };
            settle().await;
            harness.drain_outputs();
            harness
        }

        async fn send(&self, event: impl Into<InputEvent>) {
            self.events.send(event.into()).await.unwrap();
            settle().await;
        }

        async fn scan(&self, id: &str) {
            self.send(BadgeScanEvent { id: id.to_string() }).await;
        }

        async fn power(&self, high: bool) {
            self.send(PowerLevelEvent { high }).await;
        }

        fn snapshot(&self) -> MachineState {
            let state = self.state.borrow().clone();
            assert!(state.is_consistent(), "inconsistent {:?}", state);
            state
        }

        fn calls(&mut self) -> Vec<(String, AuthAction)> {
            drain(&mut self.calls)
        }

        fn drain_outputs(&mut self) -> (Vec<bool>, Vec<IndicatorMode>, Vec<IndicatorMode>) {
            (
                drain(&mut self.relay),
                drain(&mut self.green),
                drain(&mut self.red),
            )
        }
    }

    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Let the orchestrator and spawned calls run to idle
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn call(badge: &str, action: AuthAction) -> (String, AuthAction) {
        (badge.to_string(), action)
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_outputs() {
        let (relay_tx, mut relay) = mpsc::unbounded_channel();
        let (green_tx, mut green) = mpsc::unbounded_channel();
        let (red_tx, mut red) = mpsc::unbounded_channel();
        let (calls_tx, _calls) = mpsc::unbounded_channel();
        let publisher = Arc::new(RecordingPublisher::default());
        let outputs = Outputs {
            relay: RelayHandle::from_sender(relay_tx),
            green: IndicatorHandle::from_sender("green", green_tx),
            red: IndicatorHandle::from_sender("red", red_tx),
        };
        let authorizer = Arc::new(FakeAuthorizer {
            calls: calls_tx,
            denied: HashSet::new(),
            hanging: HashSet::new(),
        });

        let orchestrator = Orchestrator::new(CONFIG, outputs, authorizer, publisher.clone());
        let (_events, events_rx) = events::channel();
        let (_shutdown, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(orchestrator.run(events_rx, shutdown_rx));
        settle().await;

        assert_eq!(drain(&mut relay), vec![false]);
        assert_eq!(drain(&mut green), vec![IndicatorMode::OFF]);
        assert_eq!(drain(&mut red), vec![IndicatorMode::ON]);
        assert_eq!(
            *publisher.values.lock(),
            vec![
                (Component::Relay, "OFF".to_string()),
                (Component::Badge, String::new()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_timeline() {
        let mut h = Harness::start(&[], &[]).await;

        h.scan("ABC").await;
        let state = h.snapshot();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.badge_id, "ABC");
        assert!(state.relay_on);
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Initial)]);
        let (relay, green, red) = h.drain_outputs();
        assert_eq!(relay, vec![true]);
        assert_eq!(green, vec![IndicatorMode::blink(timing::SESSION_BLINK)]);
        assert_eq!(red, vec![IndicatorMode::OFF]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.power(true).await;
        assert_eq!(h.snapshot().phase, Phase::InUse);
        assert_eq!(h.drain_outputs().1, vec![IndicatorMode::ON]);

        // Idle deadline is cancelled while in use
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(h.snapshot().phase, Phase::InUse);
        h.power(false).await;
        assert_eq!(h.snapshot().phase, Phase::Idle);
        assert_eq!(
            h.drain_outputs().1,
            vec![IndicatorMode::blink(timing::SESSION_BLINK)]
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.snapshot().phase, Phase::Idle);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let state = h.snapshot();
        assert_eq!(state.phase, Phase::Off);
        assert!(!state.relay_on);
        assert!(state.badge_id.is_empty());
        let (relay, green, red) = h.drain_outputs();
        assert_eq!(relay, vec![false]);
        assert_eq!(green, vec![IndicatorMode::OFF]);
        assert_eq!(red, vec![IndicatorMode::ON]);
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Return)]);

        // Extension deadline went away with the session
        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert!(h.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_rearms_while_in_use() {
        let mut h = Harness::start(&[], &[]).await;

        h.scan("ABC").await;
        h.power(true).await;
        h.calls();

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Extend)]);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Extend)]);

        let state = h.snapshot();
        assert_eq!(state.phase, Phase::InUse);
        assert!(state.relay_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_fires_while_idle() {
        let config = OrchestratorConfig {
            idle: Duration::from_secs(900),
            ..CONFIG
        };
        let mut h = Harness::with_config(config, &[], &[]).await;

        h.scan("ABC").await;
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Initial)]);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Extend)]);
        let state = h.snapshot();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.relay_on);

        tokio::time::sleep(Duration::from_secs(300)).await;
        let state = h.snapshot();
        assert_eq!(state.phase, Phase::Off);
        assert!(!state.relay_on);
        assert_eq!(h.calls(), vec![call("ABC", AuthAction::Return)]);

        // No extension for a closed session
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(h.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_badge_blinks_red() {
        let mut h = Harness::start(&["X"], &[]).await;

        h.scan("X").await;
        let state = h.snapshot();
        assert_eq!(state, MachineState::default());
        assert_eq!(h.calls(), vec![call("X", AuthAction::Initial)]);
        let (relay, green, red) = h.drain_outputs();
        assert!(relay.is_empty());
        assert!(green.is_empty());
        assert_eq!(red, vec![IndicatorMode::blink(timing::DENIAL_BLINK)]);

        tokio::time::sleep(timing::DENIAL_DURATION).await;
        assert_eq!(h.drain_outputs().2, vec![IndicatorMode::ON]);
        assert_eq!(h.snapshot().phase, Phase::Off);

        // Never retried
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_timeout_is_a_denial() {
        let mut h = Harness::start(&[], &["SLOW"]).await;

        h.scan("SLOW").await;
        tokio::time::sleep(CONFIG.auth_timeout).await;

        assert_eq!(h.snapshot().phase, Phase::Off);
        assert_eq!(
            h.drain_outputs().2,
            vec![IndicatorMode::blink(timing::DENIAL_BLINK)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_during_denial_blink_keeps_red_off() {
        let mut h = Harness::start(&["X"], &[]).await;

        h.scan("X").await;
        h.scan("ABC").await;
        assert_eq!(h.snapshot().phase, Phase::Idle);
        h.drain_outputs();

        h.power(true).await;
        tokio::time::sleep(timing::DENIAL_DURATION * 2).await;
        assert!(h.drain_outputs().2.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scans_during_session_never_authorize() {
        let mut h = Harness::start(&[], &[]).await;

        h.scan("A").await;
        h.scan("B").await;
        h.power(true).await;
        h.scan("C").await;

        assert_eq!(h.calls(), vec![call("A", AuthAction::Initial)]);
        assert_eq!(h.snapshot().badge_id, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconsistent_power_events_are_ignored() {
        let mut h = Harness::start(&[], &[]).await;

        h.power(true).await;
        h.power(false).await;
        let state = h.snapshot();
        assert_eq!(state.phase, Phase::Off);
        assert!(!state.current_high);
        assert_eq!(h.drain_outputs(), (vec![], vec![], vec![]));

        // Still serving events afterwards
        h.scan("ABC").await;
        assert_eq!(h.snapshot().phase, Phase::Idle);
        h.power(true).await;
        h.power(true).await;
        assert_eq!(h.snapshot().phase, Phase::InUse);
        assert!(h.snapshot().current_high);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_level_is_published() {
        let h = Harness::start(&[], &[]).await;

        h.power(true).await;
        h.power(false).await;

        let values = h.publisher.values.lock().clone();
        let current: Vec<_> = values
            .into_iter()
            .filter(|(component, _)| *component == Component::CurrentSensor)
            .map(|(_, value)| value)
            .collect();
        assert_eq!(current, vec!["ON".to_string(), "OFF".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_events_update_flag_only() {
        let h = Harness::start(&[], &[]).await;

        h.send(BrokerEvent::Connected).await;
        assert!(h.snapshot().broker_connected);
        assert_eq!(h.snapshot().phase, Phase::Off);

        h.send(BrokerEvent::Disconnected {
            reason: "connection reset".to_string(),
        })
        .await;
        assert!(!h.snapshot().broker_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_powers_off() {
        let mut h = Harness::start(&[], &[]).await;

        h.scan("ABC").await;
        h.drain_outputs();
        h.shutdown.send(()).unwrap();
        settle().await;

        assert!(h.task.is_finished());
        let (relay, green, red) = h.drain_outputs();
        assert_eq!(relay, vec![false]);
        assert_eq!(green, vec![IndicatorMode::OFF]);
        assert_eq!(red, vec![IndicatorMode::ON]);
    }
}
