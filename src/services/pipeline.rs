use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{info, warn};

use crate::{
    services::{
        ingest::{self, IngestBackend},
        throttle,
    },
    state::SharedState,
};

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Owner of every periodic pipeline loop.
///
/// All loops watch one shutdown channel, so `stop()` can deterministically
/// cancel the outstanding work, attempt a final flush of the local buffer,
/// and abort the pending lifecycle timers before the process exits.
pub struct Pipeline {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    state: SharedState,
}

impl Pipeline {
    /// Spawn the fanout throttle loops and, in local mode, the periodic
    /// buffer flush.
    pub fn start(state: SharedState) -> Self {
        let (shutdown, _initial) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(throttle::run_stats_loop(
            state.clone(),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(throttle::run_answered_loop(
            state.clone(),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(throttle::run_leaderboard_loop(
            state.clone(),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(throttle::run_viewer_count_loop(
            state.clone(),
            shutdown.subscribe(),
        )));

        if !state.config().stream_mode() {
            tasks.push(tokio::spawn(ingest::run_flush_loop(
                state.clone(),
                shutdown.subscribe(),
            )));
        }

        info!(loops = tasks.len(), "pipeline started");
        Self {
            shutdown,
            tasks,
            state,
        }
    }

    /// Signal every loop to stop, flush what is still buffered, and cancel
    /// the lifecycle timers.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        if let Err(err) = self.state.ingest().flush_all().await {
            warn!(error = %err, "final flush failed; pending answers stay queued");
        }
        self.state.lifecycle().cancel_all();

        for task in self.tasks {
            if timeout(STOP_GRACE, task).await.is_err() {
                warn!("pipeline loop did not stop within the grace period");
            }
        }
        info!("pipeline stopped");
    }
}
