/// Pipeline Orchestration
///
/// One cycle walks the fixed stage order Idle → Aggregating → Training →
/// Scoring → Idle. Stage outcomes are persisted, not shared through flags:
/// a failed stage records `failed` and the cycle keeps going on stale
/// inputs — scoring in particular never waits on training, it blends with
/// the last good artifact or falls back to pure content ranking.
///
/// The whole cycle runs under a distributed lease so overlapping scheduler
/// ticks on different instances cannot double-train or double-write.
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::PipelineStateStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, PipelineStage, StageOutcome};
use crate::services::aggregator::InteractionAggregator;
use crate::services::hybrid::HybridRanker;
use crate::services::trainer::{CfTrainer, TrainOutcome};

/// Lease seam so orchestration is testable without Redis.
#[async_trait]
pub trait CycleLease: Send + Sync {
    async fn try_acquire(&self) -> anyhow::Result<bool>;
    async fn renew(&self) -> anyhow::Result<bool>;
    async fn release(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl CycleLease for run_lease::RunLease {
    async fn try_acquire(&self) -> anyhow::Result<bool> {
        run_lease::RunLease::try_acquire(self).await
    }

    async fn renew(&self) -> anyhow::Result<bool> {
        run_lease::RunLease::renew(self).await
    }

    async fn release(&self) -> anyhow::Result<()> {
        run_lease::RunLease::release(self).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub aggregation: Option<StageOutcome>,
    pub training: Vec<(CandidateKind, StageOutcome)>,
    pub scoring: Vec<(CandidateKind, StageOutcome)>,
    pub aborted: bool,
}

/// Worst-of combination for a stage that fans out per kind.
pub fn combine_outcomes(outcomes: &[StageOutcome]) -> StageOutcome {
    if outcomes.iter().any(|o| *o == StageOutcome::Failed) {
        StageOutcome::Failed
    } else if outcomes.iter().all(|o| *o == StageOutcome::Skipped) {
        StageOutcome::Skipped
    } else {
        StageOutcome::Succeeded
    }
}

pub struct Pipeline {
    aggregator: InteractionAggregator,
    trainer: CfTrainer,
    ranker: HybridRanker,
    state: Arc<dyn PipelineStateStore>,
    lease: Arc<dyn CycleLease>,
    shutdown: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        aggregator: InteractionAggregator,
        trainer: CfTrainer,
        ranker: HybridRanker,
        state: Arc<dyn PipelineStateStore>,
        lease: Arc<dyn CycleLease>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            aggregator,
            trainer,
            ranker,
            state,
            lease,
            shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run one full cycle under the lease. `Err(LeaseUnavailable)` means
    /// another instance is mid-cycle; the caller retries on its next tick.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let acquired = self
            .lease
            .try_acquire()
            .await
            .map_err(|e| AppError::LeaseUnavailable(e.to_string()))?;
        if !acquired {
            return Err(AppError::LeaseUnavailable(
                "pipeline lease held by another instance".to_string(),
            ));
        }

        let result = self.run_stages().await;

        if let Err(e) = self.lease.release().await {
            warn!(error = %e, "failed to release pipeline lease, it will expire");
        }

        result
    }

    async fn run_stages(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut stage = Some(PipelineStage::Aggregating);

        while let Some(current) = stage {
            if self.shutdown_requested() {
                info!(stage = %current, "shutdown requested, aborting cycle before stage");
                report.aborted = true;
                break;
            }

            match current {
                PipelineStage::Aggregating => self.run_aggregation(&mut report).await?,
                PipelineStage::Training => self.run_training(&mut report).await?,
                PipelineStage::Scoring => self.run_scoring(&mut report).await?,
            }

            match self.lease.renew().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(stage = %current, "pipeline lease lost mid-cycle, aborting");
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    warn!(stage = %current, error = %e, "lease renewal failed, aborting cycle");
                    report.aborted = true;
                    break;
                }
            }

            stage = current.next();
        }

        Ok(report)
    }

    async fn run_aggregation(&self, report: &mut CycleReport) -> Result<()> {
        let outcome = match self.aggregator.aggregate(Utc::now()).await {
            Ok(agg) => {
                let detail = format!(
                    "events={} contributions={} skipped={}",
                    agg.events_processed, agg.contributions_applied, agg.skipped_unknown_candidate
                );
                self.state
                    .record_stage(PipelineStage::Aggregating, StageOutcome::Succeeded, Some(&detail))
                    .await?;
                StageOutcome::Succeeded
            }
            Err(e) => {
                // Later stages still run, just on stale interaction scores.
                error!(error = %e, "aggregation stage failed");
                self.state
                    .record_stage(
                        PipelineStage::Aggregating,
                        StageOutcome::Failed,
                        Some(&e.to_string()),
                    )
                    .await?;
                StageOutcome::Failed
            }
        };
        report.aggregation = Some(outcome);
        Ok(())
    }

    async fn run_training(&self, report: &mut CycleReport) -> Result<()> {
        let mut details = Vec::new();

        for kind in CandidateKind::ALL {
            let outcome = match self.trainer.train(kind).await {
                Ok(TrainOutcome::Trained(artifact)) => {
                    details.push(format!("{kind}: trained v{}", artifact.version));
                    StageOutcome::Succeeded
                }
                Ok(TrainOutcome::Skipped(reason)) => {
                    details.push(format!("{kind}: skipped ({reason})"));
                    StageOutcome::Skipped
                }
                Err(e) => {
                    // The last good artifact stays authoritative.
                    error!(kind = %kind, error = %e, "training stage failed");
                    details.push(format!("{kind}: failed ({e})"));
                    StageOutcome::Failed
                }
            };
            report.training.push((kind, outcome));
        }

        let combined = combine_outcomes(
            &report.training.iter().map(|(_, o)| *o).collect::<Vec<_>>(),
        );
        self.state
            .record_stage(PipelineStage::Training, combined, Some(&details.join("; ")))
            .await?;
        Ok(())
    }

    async fn run_scoring(&self, report: &mut CycleReport) -> Result<()> {
        let mut details = Vec::new();

        for kind in CandidateKind::ALL {
            let outcome = match self.ranker.score_kind(kind).await {
                Ok(scoring) => {
                    details.push(format!(
                        "{kind}: users={} skipped={} records={}",
                        scoring.users_scored, scoring.users_skipped, scoring.records_written
                    ));
                    StageOutcome::Succeeded
                }
                Err(e) => {
                    // Previously served sets stay untouched and consistent.
                    error!(kind = %kind, error = %e, "scoring stage failed");
                    details.push(format!("{kind}: failed ({e})"));
                    StageOutcome::Failed
                }
            };
            report.scoring.push((kind, outcome));
        }

        let combined = combine_outcomes(
            &report.scoring.iter().map(|(_, o)| *o).collect::<Vec<_>>(),
        );
        self.state
            .record_stage(PipelineStage::Scoring, combined, Some(&details.join("; ")))
            .await?;
        Ok(())
    }
}
