/*!
 * Stage abstraction and the shared batch-processing runner.
 *
 * A stage invocation walks a fixed state machine:
 *
 * `Init -> Loading-Input -> Batching -> Processing(i/N) -> Persisting -> Done | Failed`
 *
 * The runner owns everything stage-agnostic: reloading units from the store,
 * skipping already-terminal units (idempotent re-entry), partitioning into
 * concurrency-bounded batches, running each batch concurrently under a
 * shared deadline, fail-soft degradation of units whose every attempt
 * failed, per-batch persistence and per-batch progress reporting, and the
 * batch-boundary cancellation check. Stages contribute only their unit
 * semantics: `process_unit`, the fail-soft `fallback_output`, and a
 * `finalize` hook that runs once before Done.
 */

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::batch;
use crate::errors::{ProviderError, StageError};
use crate::store::models::{JobRecord, JobStatus, UnitKind, WorkUnitRecord};
use crate::store::repository::Repository;

use super::progress::{ProgressBand, ProgressTracker, ProgressUpdate};

/// Shared services handed to every stage invocation
pub struct StageContext {
    /// Job/work-unit store
    pub repo: Repository,
    /// Single writer for job progress
    pub tracker: Arc<ProgressTracker>,
}

/// Counters describing one stage invocation
#[derive(Debug, Default, Clone)]
pub struct StageReport {
    /// Units belonging to this stage, terminal or not
    pub total_units: usize,
    /// Units that were already terminal when the stage started
    pub skipped: usize,
    /// Units completed with a real result in this invocation
    pub completed: usize,
    /// Units degraded to their fallback result in this invocation
    pub degraded: usize,
    /// Whether cancellation was observed at a batch boundary
    pub cancelled: bool,
}

impl StageReport {
    /// Units that reached a terminal state in this invocation
    pub fn processed(&self) -> usize {
        self.completed + self.degraded
    }
}

/// A pipeline phase transforming all work units of one kind for a job
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name used in job records and logs
    fn name(&self) -> &'static str;

    /// Progress interval this stage owns
    fn band(&self) -> ProgressBand;

    /// Kind of work units this stage consumes
    fn input_kind(&self) -> UnitKind;

    /// Maximum units processed concurrently within one batch
    fn concurrency(&self) -> usize;

    /// Wall-clock bound for one batch; units unfinished at the deadline are
    /// degraded, finished ones keep their results
    fn batch_timeout(&self) -> Duration;

    /// Process one unit to a successful result payload
    async fn process_unit(
        &self,
        job: &JobRecord,
        unit: &WorkUnitRecord,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Fail-soft result recorded when every attempt at a unit failed
    fn fallback_output(&self, unit: &WorkUnitRecord) -> serde_json::Value;

    /// Runs once after all batches persisted, before Done. Returns the final
    /// stage message shown on the job record.
    async fn finalize(
        &self,
        job: &JobRecord,
        report: &StageReport,
        ctx: &StageContext,
    ) -> Result<String, StageError>;
}

/// Drive one stage invocation through the full state machine.
pub async fn run_stage(
    stage: &dyn Stage,
    job: &JobRecord,
    ctx: &StageContext,
) -> Result<StageReport, StageError> {
    let stage_name = stage.name();
    let band = stage.band();

    // Loading-Input: always from the store, never from memory.
    let units = ctx
        .repo
        .load_units(&job.id, stage.input_kind())
        .await
        .map_err(|e| StageError::Persistence(e.to_string()))?;
    if units.is_empty() {
        return Err(StageError::NoInput {
            stage: stage_name,
            job_id: job.id.clone(),
        });
    }

    let total_units = units.len();
    let (pending, terminal): (Vec<_>, Vec<_>) =
        units.into_iter().partition(|u| !u.status.is_terminal());

    let mut report = StageReport {
        total_units,
        skipped: terminal.len(),
        ..Default::default()
    };

    info!(
        "[{}] job {}: {} unit(s), {} already terminal",
        stage_name,
        job.id,
        total_units,
        report.skipped
    );

    if pending.is_empty() {
        // Idempotent re-entry: nothing to do, no provider calls.
        let message = stage.finalize(job, &report, ctx).await?;
        advance(
            ctx,
            &job.id,
            ProgressUpdate::at(band.end)
                .with_stage(stage_name)
                .with_message(message),
        )
        .await?;
        return Ok(report);
    }

    advance(
        ctx,
        &job.id,
        ProgressUpdate::at(band.start)
            .with_status(JobStatus::Processing)
            .with_stage(stage_name)
            .with_message(format!("{}: processing {} unit(s)", stage_name, pending.len())),
    )
    .await?;

    // Batching.
    let batches = batch::partition(pending, stage.concurrency())
        .map_err(|e| StageError::Configuration(e.to_string()))?;
    let batch_count = batches.len();

    // Processing: batches sequentially, units within a batch concurrently.
    for (batch_index, batch_units) in batches.into_iter().enumerate() {
        // Cancellation is only observed here, between batches.
        if job_cancelled(ctx, &job.id).await? {
            info!(
                "[{}] job {}: cancellation observed before batch {}/{}",
                stage_name,
                job.id,
                batch_index + 1,
                batch_count
            );
            report.cancelled = true;
            return Ok(report);
        }

        let deadline = tokio::time::Instant::now() + stage.batch_timeout();
        let timeout_ms = stage.batch_timeout().as_millis() as u64;

        let unit_futures = batch_units.iter().map(|unit| async move {
            match tokio::time::timeout_at(deadline, stage.process_unit(job, unit)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout_ms)),
            }
        });
        let results = join_all(unit_futures).await;

        // A unit failure never cancels its siblings: every unit gets a
        // terminal record, real or fallback.
        let updated: Vec<WorkUnitRecord> = batch_units
            .iter()
            .zip(results)
            .map(|(unit, result)| match result {
                Ok(output) => {
                    report.completed += 1;
                    unit.clone().completed(output)
                }
                Err(err) => {
                    warn!(
                        "[{}] job {}: unit {} (ordinal {}) degraded: {}",
                        stage_name, job.id, unit.id, unit.ordinal, err
                    );
                    report.degraded += 1;
                    unit.clone()
                        .degraded(stage.fallback_output(unit), err.to_string())
                }
            })
            .collect();

        // Persisting: once per batch; a write failure is stage-fatal.
        ctx.repo
            .upsert_unit_results(updated)
            .await
            .map_err(|e| StageError::Persistence(e.to_string()))?;

        // One progress write per batch, not per unit.
        advance(
            ctx,
            &job.id,
            ProgressUpdate::at(band.at(batch_index + 1, batch_count)).with_message(format!(
                "{}: batch {}/{} done",
                stage_name,
                batch_index + 1,
                batch_count
            )),
        )
        .await?;
    }

    // Done.
    let message = stage.finalize(job, &report, ctx).await?;
    advance(
        ctx,
        &job.id,
        ProgressUpdate::at(band.end).with_message(message),
    )
    .await?;

    info!(
        "[{}] job {}: done ({} completed, {} degraded, {} skipped)",
        stage_name, job.id, report.completed, report.degraded, report.skipped
    );

    Ok(report)
}

async fn advance(ctx: &StageContext, job_id: &str, update: ProgressUpdate) -> Result<(), StageError> {
    ctx.tracker
        .advance(job_id, update)
        .await
        .map_err(|e| StageError::Persistence(e.to_string()))
}

async fn job_cancelled(ctx: &StageContext, job_id: &str) -> Result<bool, StageError> {
    let job = ctx
        .repo
        .get_job(job_id)
        .await
        .map_err(|e| StageError::Persistence(e.to_string()))?;
    Ok(matches!(
        job.map(|j| j.status),
        Some(JobStatus::Cancelled)
    ))
}
