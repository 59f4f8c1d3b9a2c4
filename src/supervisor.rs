//! Task supervision
//!
//! The input sources and the orchestrator run as separate tasks. The machine
//! keeps running only while all of them do: a source that ends (for example
//! an unplugged badge reader) leaves nothing to drive the state machine, so
//! the orchestrator is shut down through its normal power-off path and the
//! process exits with a failure.

use std::fmt;
use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Why supervision ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Ctrl-C or SIGTERM
    Signal,
    /// An input source task ended
    SourceStopped(&'static str),
    /// The orchestrator ended on its own
    OrchestratorStopped,
}

impl Exit {
    /// Whether the process should report failure
    pub fn is_failure(&self) -> bool {
        !matches!(self, Exit::Signal)
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Signal => write!(f, "shutdown signal"),
            Exit::SourceStopped(name) => write!(f, "{} stopped", name),
            Exit::OrchestratorStopped => write!(f, "orchestrator stopped"),
        }
    }
}

/// Wait for a shutdown signal, a source ending, or the orchestrator ending
///
/// In the first two cases the orchestrator is told to shut down and awaited,
/// so its power-off pattern is applied before this returns.
pub async fn supervise(
    signal: impl Future<Output = ()>,
    sources: Vec<(&'static str, JoinHandle<()>)>,
    mut orchestrator: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
) -> Exit {
    let mut sources: FuturesUnordered<_> = sources
        .into_iter()
        .map(|(name, handle)| async move {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", name, e);
            }
            name
        })
        .collect();
    let has_sources = !sources.is_empty();

    let exit = tokio::select! {
        _ = signal => Exit::Signal,
        Some(name) = sources.next(), if has_sources => {
            error!("Input source {} stopped, shutting down", name);
            Exit::SourceStopped(name)
        }
        result = &mut orchestrator => {
            if let Err(e) = result {
                error!("Orchestrator task failed: {}", e);
            }
            error!("Orchestrator stopped unexpectedly");
            return Exit::OrchestratorStopped;
        }
    };

    let _ = shutdown.send(());
    if let Err(e) = orchestrator.await {
        error!("Orchestrator task failed during shutdown: {}", e);
    }
    info!("Orchestrator stopped after {}", exit);
    exit
}
