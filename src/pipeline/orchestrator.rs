/*!
 * Pipeline orchestrator.
 *
 * Sequences the stages of a job per a fixed table, owns the progress-range
 * allocation, and decides terminal job status. The OCR stage owns 0-30% and
 * the translation stage 40-85%; the gaps belong to phases outside this crate
 * (language detection is folded into OCR output, document rebuild follows
 * downstream and takes the job from 85 to 100).
 */

use log::{error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::errors::{PipelineError, StageError};
use crate::ocr::EnginePool;
use crate::retry::RetryPolicy;
use crate::router::ProviderRouter;
use crate::store::models::{JobRecord, JobStatus};
use crate::store::repository::Repository;

use super::ocr_stage::OcrStage;
use super::progress::{ProgressBand, ProgressTracker, ProgressUpdate};
use super::stage::{Stage, StageContext, StageReport, run_stage};
use super::translation_stage::TranslationStage;

/// Progress interval owned by the OCR stage
pub const OCR_BAND: ProgressBand = ProgressBand::new(0, 30);

/// Progress interval owned by the translation stage
pub const TRANSLATION_BAND: ProgressBand = ProgressBand::new(40, 85);

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineRun {
    /// Terminal job status after the run
    pub status: JobStatus,
    /// Per-stage reports in execution order
    pub reports: Vec<(&'static str, StageReport)>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl PipelineRun {
    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        let stages = self
            .reports
            .iter()
            .map(|(name, report)| {
                format!(
                    "{}: {} ok / {} degraded / {} skipped",
                    name, report.completed, report.degraded, report.skipped
                )
            })
            .collect::<Vec<_>>()
            .join(" | ");
        format!(
            "status={} in {:.2}s [{}]",
            self.status,
            self.duration.as_secs_f32(),
            stages
        )
    }
}

/// Sequences stages for jobs and owns terminal status decisions
pub struct PipelineOrchestrator {
    /// Stage table in execution order
    stages: Vec<Arc<dyn Stage>>,
    /// Shared services for stage invocations
    ctx: StageContext,
}

impl PipelineOrchestrator {
    /// Build the standard two-stage pipeline from configuration.
    pub fn standard(
        config: &Config,
        repo: Repository,
        router: Arc<ProviderRouter>,
        pool: Arc<EnginePool>,
    ) -> Result<Self, PipelineError> {
        router.ensure_usable()?;

        let retry = RetryPolicy::new(
            config.translation.max_attempts,
            Duration::from_millis(config.translation.retry_base_delay_ms),
        );

        let ocr = Arc::new(OcrStage::new(
            pool,
            retry,
            OCR_BAND,
            Duration::from_secs(config.ocr.batch_timeout_secs),
            config.translation.max_chars_per_chunk,
        ));
        let translation = Arc::new(TranslationStage::new(
            router,
            retry,
            config.translation.concurrent_requests,
            TRANSLATION_BAND,
            Duration::from_secs(config.translation.batch_timeout_secs),
            config.translation.cache_enabled,
            repo.clone(),
        ));

        Ok(Self::with_stages(repo, vec![ocr, translation]))
    }

    /// Build an orchestrator over explicit stages (used by tests)
    pub fn with_stages(repo: Repository, stages: Vec<Arc<dyn Stage>>) -> Self {
        let tracker = Arc::new(ProgressTracker::new(repo.clone()));
        Self {
            stages,
            ctx: StageContext { repo, tracker },
        }
    }

    /// Shared stage context
    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Run the full pipeline for one job.
    ///
    /// Stage-fatal errors mark the job failed and stop the run; unit-level
    /// failures never reach this level. Whole-job retry is an external
    /// decision (re-enqueue) and deliberately not implemented here.
    pub async fn run_job(&self, job_id: &str) -> Result<PipelineRun, PipelineError> {
        let started = Instant::now();
        let mut job = self.load_job(job_id).await?;

        // A cancellation that landed before the run starts is honored
        // without touching the job at all.
        if job.status == JobStatus::Cancelled {
            info!("pipeline skipped: job {} already cancelled", job.id);
            return Ok(PipelineRun {
                status: JobStatus::Cancelled,
                reports: Vec::new(),
                duration: started.elapsed(),
            });
        }

        info!(
            "pipeline start: job {} ({} -> {}, tier {})",
            job.id, job.source_language, job.target_language, job.tier
        );

        self.ctx
            .tracker
            .advance(
                job_id,
                ProgressUpdate::at(0)
                    .with_status(JobStatus::Processing)
                    .with_message("pipeline started"),
            )
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            match run_stage(stage.as_ref(), &job, &self.ctx).await {
                Ok(report) if report.cancelled => {
                    reports.push((stage.name(), report));
                    info!("pipeline cancelled: job {} during {}", job.id, stage.name());
                    self.ctx
                        .tracker
                        .advance(
                            job_id,
                            ProgressUpdate::message(format!(
                                "cancelled during {}",
                                stage.name()
                            ))
                            .with_status(JobStatus::Cancelled),
                        )
                        .await
                        .map_err(|e| PipelineError::Store(e.to_string()))?;
                    return Ok(PipelineRun {
                        status: JobStatus::Cancelled,
                        reports,
                        duration: started.elapsed(),
                    });
                }
                Ok(report) => {
                    reports.push((stage.name(), report));
                }
                Err(err) => {
                    error!("pipeline failed: job {} stage {}: {}", job.id, stage.name(), err);
                    self.mark_failed(job_id, stage.name(), &err).await?;
                    return Err(PipelineError::Stage {
                        job_id: job_id.to_string(),
                        stage: stage.name(),
                        source: err,
                    });
                }
            }

            // Reload between stages: cancellation or external edits may have
            // landed while the stage ran.
            job = self.load_job(job_id).await?;
            if job.status == JobStatus::Cancelled {
                info!("pipeline cancelled: job {} between stages", job.id);
                return Ok(PipelineRun {
                    status: JobStatus::Cancelled,
                    reports,
                    duration: started.elapsed(),
                });
            }
        }

        // All stages done: the job is ready for the external rebuild phase.
        self.ctx
            .tracker
            .advance(
                job_id,
                ProgressUpdate::at(TRANSLATION_BAND.end)
                    .with_status(JobStatus::Done)
                    .with_message("translation complete; ready for document rebuild"),
            )
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        let run = PipelineRun {
            status: JobStatus::Done,
            reports,
            duration: started.elapsed(),
        };
        info!("pipeline done: job {} ({})", job.id, run.summary());
        Ok(run)
    }

    async fn load_job(&self, job_id: &str) -> Result<JobRecord, PipelineError> {
        self.ctx
            .repo
            .get_job(job_id)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))
    }

    async fn mark_failed(
        &self,
        job_id: &str,
        stage: &'static str,
        err: &StageError,
    ) -> Result<(), PipelineError> {
        self.ctx
            .tracker
            .advance(
                job_id,
                ProgressUpdate::message(format!("{} failed: {}", stage, err))
                    .with_status(JobStatus::Failed)
                    .with_error(err.to_string()),
            )
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))
    }
}
