//! Background reload loop.
//!
//! Rebuilds the conversation cache from storage on a fixed cadence until the
//! cancellation token fires. A failed reload is logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::delivery::OutboundSender;
use crate::repository::PersistenceGateway;
use crate::sync::controller::SyncController;

/// Spawn the periodic reload task. The first reload happens one `every`
/// after the call; callers perform their own startup reload.
pub fn spawn_periodic_reload<G, O>(
    controller: Arc<SyncController<G, O>>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    G: PersistenceGateway + 'static,
    O: OutboundSender + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("periodic reload stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = controller.reload().await {
                        warn!(error = %err, "periodic reload failed");
                    }
                }
            }
        }
    })
}
