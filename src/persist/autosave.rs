//! Periodic flushing
//!
//! Drives [`PersistenceQueue::save_data`] on a fixed interval until stopped, then
//! runs one last flush so a clean shutdown leaves nothing buffered that could be saved.

use super::queue::{PersistenceQueue, SaveReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default flush cadence
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 500;

/// Background task that flushes a queue on an interval
pub struct AutoSaver {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<SaveReport>>,
}

impl AutoSaver {
    /// Spawn the flush loop. Must be called inside a Tokio runtime.
    pub fn start(queue: Arc<PersistenceQueue>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                space_id = %queue.space_id(),
                interval_ms = interval.as_millis() as u64,
                "Autosave started"
            );

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if queue.has_pending_data() {
                            let report = queue.save_data().await;
                            if !report.is_clean() {
                                warn!(
                                    space_id = %queue.space_id(),
                                    trees_failed = report.trees_failed.len(),
                                    secrets_failed = report.secrets_error.is_some(),
                                    "Autosave cycle left data pending"
                                );
                            }
                        }
                    }
                }
            }

            let report = queue.save_data().await;
            debug!(space_id = %queue.space_id(), clean = report.is_clean(), "Autosave final flush");
            info!(space_id = %queue.space_id(), "Autosave stopped");
            report
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait for the final flush.
    pub async fn stop(mut self) -> SaveReport {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Autosave task ended abnormally");
                SaveReport::default()
            }),
            None => SaveReport::default(),
        }
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        // Dropping without `stop` still ends the loop; the final flush runs detached.
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
