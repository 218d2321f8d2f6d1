//! Background cache maintenance
//!
//! One task drives both jobs so a corruption truncate never overlaps a
//! refresh. The corruption check wins when both are due, which lets a
//! cleared cache be rebuilt by the refresh that follows.

use crate::cache::maintenance::CacheMaintainer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Running maintenance task
pub struct MaintenanceHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task and wait for the in-flight job to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("Cache maintenance task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the maintenance loop; both jobs run once immediately
pub fn start_maintenance(maintainer: Arc<CacheMaintainer>) -> MaintenanceHandle {
    let (stop, mut stop_rx) = watch::channel(false);
    let refresh_period = maintainer.config().refresh_interval.max(MIN_PERIOD);
    let check_period = maintainer.config().corruption_check_interval.max(MIN_PERIOD);

    let task = tokio::spawn(async move {
        let mut refresh = tokio::time::interval(refresh_period);
        let mut check = tokio::time::interval(check_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Cache maintenance started (refresh every {:?}, corruption check every {:?})",
            refresh_period, check_period
        );

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = check.tick() => {
                    if maintainer.detect_and_fix_corrupted_cache().await {
                        // Rebuild right away rather than waiting a full period
                        refresh.reset_immediately();
                    }
                }
                _ = refresh.tick() => {
                    let outcome = maintainer.refresh().await;
                    debug!("Scheduled refresh updated {} devices", outcome.updated);
                }
            }
        }

        info!("Cache maintenance stopped");
    });

    MaintenanceHandle { stop, task }
}
