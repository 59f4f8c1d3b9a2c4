use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authbox::actuator::{spawn_indicator, spawn_relay};
use authbox::auth::HttpAuthorizer;
use authbox::badge::BadgeReader;
use authbox::config::{ConfigLoader, DEFAULT_CONTROL_URL};
use authbox::events;
use authbox::gpio::{self, GpioLevelInput, GpioOutput};
use authbox::mqtt::{MqttReporter, NoopPublisher, StatePublisher};
use authbox::orchestrator::{Orchestrator, OrchestratorConfig, Outputs};
use authbox::supervisor::supervise;

/// How long the output sinks get to apply the shutdown pattern
const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// authbox command line arguments
#[derive(Parser, Debug)]
#[command(name = "authbox")]
#[command(version, about = "Badge-gated power switch for shared workshop machines", long_about = None)]
struct CliArgs {
    /// Command & control base URL serving /config/<hostname>
    #[arg(value_name = "CONTROL_URL", default_value = DEFAULT_CONTROL_URL)]
    control_url: String,

    /// Local configuration file used when command & control is unreachable
    #[arg(long, env = "LOCAL_CONFIG_FILE", value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Device name used for configuration lookup and MQTT topics
    #[arg(long, value_name = "NAME")]
    hostname: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting authbox v{}", env!("CARGO_PKG_VERSION"));

    let hostname = match args.hostname {
        Some(name) => name,
        None => system_hostname()?,
    };
    tracing::info!("Device name: {}", hostname);

    let loader = ConfigLoader::new(&args.control_url, args.config_file)?;
    let config = loader
        .load(&hostname)
        .await
        .context("no usable configuration")?;

    // Hardware acquisition is all-or-nothing
    let mut chip = gpio::find_chip(&config.gpio_chip_label)?;
    tracing::info!("Using GPIO chip {}", chip.label());
    let relay_pin = GpioOutput::request(&mut chip, config.relay.pin, config.relay.active_low)?;
    let green_pin =
        GpioOutput::request(&mut chip, config.green_led.pin, config.green_led.active_low)?;
    let red_pin = GpioOutput::request(&mut chip, config.red_led.pin, config.red_led.active_low)?;
    let sensor = GpioLevelInput::request(chip.path(), &config.current_sensing)?;
    let reader = BadgeReader::open(&config.badge_reader)?;

    let (relay, relay_task) =
        spawn_relay(relay_pin, Duration::from_millis(config.relay.debounce_ms));
    let (green, green_task) = spawn_indicator("green", green_pin);
    let (red, red_task) = spawn_indicator("red", red_pin);

    let (events_tx, events_rx) = events::channel();
    let reader_task = reader.spawn(events_tx.clone())?;
    let sensor_task = tokio::spawn(gpio::watch_level(
        sensor,
        config.current_sensing.debounce(),
        events_tx.clone(),
    ));

    let publisher: Arc<dyn StatePublisher> = match &config.mqtt {
        Some(mqtt) => {
            let (reporter, _) = MqttReporter::start(mqtt, &hostname, events_tx.clone())?;
            reporter
        }
        None => {
            tracing::info!("No MQTT broker configured, state reporting disabled");
            Arc::new(NoopPublisher)
        }
    };
    drop(events_tx);

    let authorizer = Arc::new(HttpAuthorizer::new(&config.badge_auth)?);
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from_config(&config),
        Outputs { relay, green, red },
        authorizer,
        publisher,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let orchestrator_task = tokio::spawn(orchestrator.run(events_rx, shutdown_rx));

    let exit = supervise(
        shutdown_signal(),
        vec![("badge reader", reader_task), ("current sensor", sensor_task)],
        orchestrator_task,
        shutdown_tx,
    )
    .await;

    // Sinks exit once the orchestrator's handles are gone
    let sinks = futures::future::join_all([relay_task, green_task, red_task]);
    if tokio::time::timeout(SINK_DRAIN_TIMEOUT, sinks).await.is_err() {
        tracing::warn!("Output sinks did not finish in time");
    }

    if exit.is_failure() {
        anyhow::bail!("authbox stopped: {}", exit);
    }
    tracing::info!("authbox stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

fn system_hostname() -> anyhow::Result<String> {
    let name = nix::unistd::gethostname().context("cannot read hostname")?;
    name.into_string()
        .map_err(|raw| anyhow::anyhow!("hostname is not valid UTF-8: {:?}", raw))
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "authbox=error,rumqttc=error",
        LogLevel::Warn => "authbox=warn,rumqttc=warn",
        LogLevel::Info => "authbox=info,rumqttc=warn",
        LogLevel::Verbose => "authbox=debug,rumqttc=warn",
        LogLevel::Debug => "authbox=debug,rumqttc=info",
        LogLevel::Trace => "authbox=trace,rumqttc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
