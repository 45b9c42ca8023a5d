/*!
 * Monotonic job progress tracking.
 *
 * The tracker is the only writer of job progress/status during a run. Stages
 * report once per batch (never per unit) and the tracker enforces the
 * monotonicity invariant twice: an in-memory high-water mark drops stale
 * writes before they reach the store, and the store itself clamps with
 * `MAX(progress, new)`.
 */

use anyhow::Result;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::store::models::JobStatus;
use crate::store::repository::{JobUpdate, Repository};

/// The [start, end] percentage interval a stage is allotted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBand {
    /// Progress written when the stage begins
    pub start: u8,
    /// Progress written when the stage completes
    pub end: u8,
}

impl ProgressBand {
    /// Create a band; `end` must not be below `start`
    pub const fn new(start: u8, end: u8) -> Self {
        assert!(start <= end);
        assert!(end <= 100);
        Self { start, end }
    }

    /// Progress after `done` of `total` batches:
    /// `start + done/total * (end - start)`.
    pub fn at(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let span = (self.end - self.start) as f64;
        let fraction = (done.min(total) as f64) / (total as f64);
        self.start + (span * fraction).round() as u8
    }
}

/// One partial update to a job's progress record
#[derive(Debug, Default, Clone)]
pub struct ProgressUpdate {
    /// New status
    pub status: Option<JobStatus>,
    /// New progress percentage
    pub progress: Option<u8>,
    /// New active stage name
    pub stage: Option<String>,
    /// New display message
    pub message: Option<String>,
    /// New error detail
    pub error_detail: Option<String>,
}

impl ProgressUpdate {
    /// Update carrying only a progress value
    pub fn at(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Update carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the progress value
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the stage name
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Set the display message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the error detail
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_detail = Some(error.into());
        self
    }
}

/// Single-writer projection of pipeline state onto job records
pub struct ProgressTracker {
    /// Store handle
    repo: Repository,
    /// Highest progress written per job during this process lifetime
    high_water: Mutex<HashMap<String, u8>>,
}

impl ProgressTracker {
    /// Create a tracker over the given repository
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Apply an update to a job. Progress values below the in-memory
    /// high-water mark are dropped; everything else is forwarded to the
    /// store (which clamps again).
    pub async fn advance(&self, job_id: &str, update: ProgressUpdate) -> Result<()> {
        let progress = update.progress.map(|p| p.min(100));

        let progress = match progress {
            Some(p) => {
                let mut marks = self.high_water.lock();
                let mark = marks.entry(job_id.to_string()).or_insert(0);
                if p < *mark {
                    debug!(
                        "dropping regressing progress {} (high water {}) for job {}",
                        p, *mark, job_id
                    );
                    None
                } else {
                    *mark = p;
                    Some(p)
                }
            }
            None => None,
        };

        self.repo
            .update_job(
                job_id,
                JobUpdate {
                    status: update.status,
                    progress,
                    stage: update.stage,
                    message: update.message,
                    error_detail: update.error_detail,
                },
            )
            .await
    }
}
