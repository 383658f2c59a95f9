//! Periodic collect-and-warn loop.
//!
//! Each iteration collects the world, warns every online player and then
//! sleeps for the configured interval. Cancellation is observed before an
//! iteration starts and while sleeping; a scan in progress always runs to
//! completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::WarningEngine;
use crate::world::{IntervalProvider, Roster};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Running,
    Stopped,
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub collected: bool,
    pub warned: usize,
    pub failed: usize,
}

/// Turn a configured interval in seconds into a sleep duration.
pub fn interval_duration(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(interval) => interval.max(MIN_INTERVAL),
        Err(_) => {
            warn!(interval = secs, "Invalid warning interval, using default");
            DEFAULT_INTERVAL
        }
    }
}

pub struct WarningCycle {
    engine: Arc<WarningEngine>,
    roster: Arc<dyn Roster>,
    interval: Arc<dyn IntervalProvider>,
    state: watch::Sender<CycleState>,
}

impl WarningCycle {
    pub fn new(
        engine: Arc<WarningEngine>,
        roster: Arc<dyn Roster>,
        interval: Arc<dyn IntervalProvider>,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Stopped);
        Self {
            engine,
            roster,
            interval,
            state,
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    /// Collect once and warn every online player. Failures for one player do
    /// not affect the others.
    pub async fn run_once(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        if let Err(e) = self.engine.force_collect() {
            warn!(error = %e, "Failed to collect grid groups, skipping warnings");
            return summary;
        }
        summary.collected = true;

        for player in self.roster.online_players() {
            match self.engine.warn_if_any(&player).await {
                Ok(true) => summary.warned += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(user = %player.id, error = %e, "Failed to warn player");
                }
            }
        }

        summary
    }

    /// Run until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        self.state.send_replace(CycleState::Running);

        while !token.is_cancelled() {
            let summary = self.run_once().await;

            let interval = interval_duration(self.interval.interval_secs());
            info!(
                interval_secs = interval.as_secs_f64(),
                warned = summary.warned,
                failed = summary.failed,
                "Ran warning"
            );

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.state.send_replace(CycleState::Stopped);
        info!("Warning cycle stopped");
    }

    /// Spawn the loop on the runtime.
    pub fn start(self: Arc<Self>, token: CancellationToken) -> CycleHandle {
        let state = self.subscribe();
        let task_token = token.clone();
        let handle = tokio::spawn(async move { self.run(task_token).await });

        CycleHandle {
            token,
            state,
            handle,
        }
    }
}

pub struct CycleHandle {
    token: CancellationToken,
    state: watch::Receiver<CycleState>,
    handle: JoinHandle<()>,
}

impl CycleHandle {
    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Cancel the loop and wait for it to finish its current iteration.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.token.cancel();
        self.handle.await
    }
}
