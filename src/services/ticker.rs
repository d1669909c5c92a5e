use std::{sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::scheduling_service::SchedulingService;

/// Drive `run_due_schedules` on a fixed interval until `shutdown` fires.
///
/// A tick always finishes before the next one starts; ticks missed while a long
/// pass was running are dropped. Cancellation lets the in-flight pass drain.
pub async fn run_ticker(
    service: Arc<SchedulingService>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Scheduler ticker started (every {:?})", period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = service.run_due_schedules().await {
                    error!("Scheduler tick failed: {}", e);
                }
            }
        }
    }

    info!("Scheduler ticker stopped");
}
