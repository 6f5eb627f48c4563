//! Background task that evicts expired packages and orphaned workspace entries.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{application::registry::Registry, domain::path::PathEntity};

/// Shortest pause between two sweeps; shorter requests are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running reaper. Dropping it also stops the loop, but only
/// [`ReaperHandle::shutdown`] waits for the last sweep to finish.
#[derive(Debug)]
pub struct ReaperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the loop to stop and wait for the in-flight sweep, if any.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(target: "folio::reaper", error = %err, "reaper task ended abnormally");
        }
    }
}

/// Sweep `registry` every `interval`, starting immediately. An interval
/// below [`MIN_INTERVAL`] is clamped to it.
///
/// Must be called from within a tokio runtime.
pub fn spawn(registry: Arc<Registry>, interval: Duration) -> ReaperHandle {
    let interval = interval.max(MIN_INTERVAL);
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            target: "folio::reaper",
            interval_ms = interval.as_millis() as u64,
            root = %registry.root().path().display(),
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stopped.changed() => break,
            }

            let registry = Arc::clone(&registry);
            match tokio::task::spawn_blocking(move || registry.sweep()).await {
                Ok(Ok(report)) => debug!(
                    target: "folio::reaper",
                    inspected = report.inspected,
                    reclaimed = report.reclaimed.len(),
                    orphans = report.orphans.len(),
                    "sweep finished"
                ),
                Ok(Err(err)) => warn!(target: "folio::reaper", error = %err, "sweep failed"),
                Err(err) => error!(target: "folio::reaper", error = %err, "sweep panicked"),
            }
        }

        info!(target: "folio::reaper", "reaper stopped");
    });

    ReaperHandle { stop, task }
}
