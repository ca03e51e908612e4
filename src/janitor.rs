//! Periodic cleanup of expired hold-locks, independent of distance runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::traits::LockJanitor;

/// Spawns a task calling [`LockJanitor::cleanup_expired`] every `every`,
/// starting immediately, until `cancel` fires. Failures are logged and
/// ignored.
pub fn spawn_lock_janitor<J>(janitor: Arc<J>, every: Duration, cancel: CancellationToken) -> JoinHandle<()>
where
    J: LockJanitor + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = janitor.cleanup_expired() => result,
            };
            match result {
                Ok(()) => debug!("expired hold-locks cleaned up"),
                Err(err) => warn!(error = %err, "expired hold-lock cleanup failed"),
            }
        }

        info!("lock janitor stopped");
    })
}
