//! Progress reporting and suspension-point polling for importers.

use anyhow::Result;

use crate::orchestrator::Orchestrator;
use crate::store::{JobId, JobStatus};

/// Verdict of a progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    /// The job left `processing` (paused/cancelled); persist nothing further
    /// and unwind.
    Yield,
}

/// Hands importer progress to the orchestrator every `interval` records and
/// polls the durable status at the same cadence, making every Nth record a
/// suspension point.
pub struct ProgressReporter<'a> {
    orch: &'a Orchestrator,
    job_id: JobId,
    interval: u64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(orch: &'a Orchestrator, job_id: JobId, interval: u64) -> Self {
        Self {
            orch,
            job_id,
            interval: interval.max(1),
        }
    }

    /// Call once per record with the running totals.
    pub async fn tick(&self, processed: u64, total: Option<u64>) -> Result<Tick> {
        if processed % self.interval != 0 {
            return Ok(Tick::Continue);
        }
        self.orch
            .update_progress(self.job_id, processed as i64, total.map(|t| t as i64))
            .await?;
        match self.orch.status(self.job_id).await? {
            JobStatus::Processing => Ok(Tick::Continue),
            status => {
                tracing::info!(job_id = self.job_id, %status, "import yielding");
                Ok(Tick::Yield)
            }
        }
    }

    /// Append a line-level error to the job's bounded log.
    pub async fn line_error(&self, message: &str) -> Result<()> {
        self.orch.append_error(self.job_id, message).await?;
        Ok(())
    }
}
