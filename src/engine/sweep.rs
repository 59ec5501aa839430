use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::state::AppState;

/// Periodically expires overdue offers until `cancel` fires.
pub async fn run_expiry_sweeper(state: Arc<AppState>, every: Duration, cancel: CancellationToken) {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("expiry sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match state.assignments.sweep_expired(Utc::now()).await {
                    Ok(report) if report.expired.is_empty() => {}
                    Ok(report) => {
                        let backfilled: usize = report
                            .backfills
                            .iter()
                            .map(|outcome| outcome.created().len())
                            .sum();
                        info!(
                            expired = report.expired.len(),
                            backfilled,
                            "expiry sweep finished"
                        );
                    }
                    Err(err) => {
                        error!(error = %err, "expiry sweep failed");
                    }
                }
            }
        }
    }
}
