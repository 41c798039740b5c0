//! Pipeline Runner Background Job
//!
//! Drives the recommendation pipeline on a fixed cadence. Each tick attempts
//! one full cycle; a tick that loses the lease race simply waits for the
//! next one. The runner exits when the shutdown channel flips, and the
//! pipeline itself checks the same channel between stages so a long cycle
//! winds down cleanly.
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::services::pipeline::Pipeline;

pub async fn run_pipeline_loop(
    pipeline: Arc<Pipeline>,
    cadence: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = cadence.as_secs(),
        "starting recommendation pipeline runner"
    );

    let mut ticker = interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cycle_start = Instant::now();
                match pipeline.run_cycle().await {
                    Ok(report) => {
                        info!(
                            duration_ms = cycle_start.elapsed().as_millis() as u64,
                            aggregation = ?report.aggregation,
                            training = ?report.training,
                            scoring = ?report.scoring,
                            aborted = report.aborted,
                            "pipeline cycle finished"
                        );
                    }
                    Err(AppError::LeaseUnavailable(reason)) => {
                        info!(%reason, "pipeline cycle skipped");
                    }
                    Err(e) => {
                        error!(
                            duration_ms = cycle_start.elapsed().as_millis() as u64,
                            error = %e,
                            "pipeline cycle failed"
                        );
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("shutdown requested, stopping pipeline runner");
                    break;
                }
                warn!("shutdown channel signalled without flag, continuing");
            }
        }
    }
}
