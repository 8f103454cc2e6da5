//! Job orchestrator: lifecycle state machine over the durable store,
//! mediating between API callers, the broker, and workers.
//!
//! The orchestrator is the only component that mutates job status, counters,
//! and error logs. Per-job serialisation is a conditional update on
//! `(id, expected_status)` at the store layer; there are no in-memory locks
//! to keep consistent with the rows.

mod error;

#[cfg(test)]
mod tests;

pub use error::OrchestratorError;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::control::JobControl;
use crate::queue::{EnqueueOpts, QueueBroker};
use crate::store::{Db, JobFilter, JobId, JobRecord, JobStatus, NewJob};

/// Result of a start CAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// pending -> processing fired.
    Started,
    /// Already processing (broker redelivery); treat as a no-op.
    AlreadyProcessing,
}

pub struct Orchestrator {
    db: Db,
    broker: Arc<QueueBroker>,
    control: Arc<JobControl>,
    error_log_cap: usize,
}

impl Orchestrator {
    pub fn new(
        db: Db,
        broker: Arc<QueueBroker>,
        control: Arc<JobControl>,
        error_log_cap: usize,
    ) -> Self {
        Self {
            db,
            broker,
            control,
            error_log_cap,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn broker(&self) -> &QueueBroker {
        &self.broker
    }

    pub fn control(&self) -> &JobControl {
        &self.control
    }

    /// Create a job row (status pending, counters zero). Does not enqueue;
    /// callers that need the broker handoff use `create_and_enqueue`.
    pub async fn create(&self, new: NewJob) -> Result<JobRecord, OrchestratorError> {
        let id = self.db.create_job(&new).await?;
        tracing::info!(
            job_id = id,
            job_type = new.job_type.as_str(),
            "job created"
        );
        self.get(id).await
    }

    /// Hand a pending job to the broker, keyed by its durable id.
    pub fn enqueue(&self, job: &JobRecord, opts: EnqueueOpts) -> Result<(), OrchestratorError> {
        self.broker
            .enqueue(job.job_type.queue(), job.id, json!({ "jobId": job.id }), opts)?;
        Ok(())
    }

    /// Create and immediately enqueue (the `POST /jobs` flow).
    pub async fn create_and_enqueue(&self, new: NewJob) -> Result<JobRecord, OrchestratorError> {
        let job = self.create(new).await?;
        self.enqueue(&job, EnqueueOpts::default())?;
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<JobRecord, OrchestratorError> {
        self.db
            .get_job(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))
    }

    pub async fn list(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<JobRecord>, i64), OrchestratorError> {
        Ok(self.db.list_jobs(filter, limit, offset).await?)
    }

    /// Durable status poll used by handlers at suspension points.
    pub async fn status(&self, id: JobId) -> Result<JobStatus, OrchestratorError> {
        self.db
            .get_job_status(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))
    }

    /// Atomic pending -> processing. Idempotent when already processing
    /// (at-least-once redelivery); refused from any other state.
    pub async fn start(&self, id: JobId) -> Result<StartOutcome, OrchestratorError> {
        if self.db.start_job(id).await? {
            return Ok(StartOutcome::Started);
        }
        match self.db.get_job_status(id).await? {
            None => Err(OrchestratorError::NotFound(id)),
            Some(JobStatus::Processing) => Ok(StartOutcome::AlreadyProcessing),
            Some(from) => Err(OrchestratorError::IllegalTransition {
                id,
                action: "start",
                from,
            }),
        }
    }

    /// Write progress counters; optionally update the known total.
    pub async fn update_progress(
        &self,
        id: JobId,
        processed: i64,
        total: Option<i64>,
    ) -> Result<(), OrchestratorError> {
        Ok(self.db.update_progress(id, processed, total).await?)
    }

    /// Append a bounded error-log entry. Never fails the job by itself.
    pub async fn append_error(&self, id: JobId, message: &str) -> Result<(), OrchestratorError> {
        self.db.append_error(id, message, self.error_log_cap).await?;
        Ok(())
    }

    /// Persist a handler checkpoint: payload rewrite plus counters.
    pub async fn checkpoint(
        &self,
        id: JobId,
        payload: &Value,
        processed: i64,
        total: Option<i64>,
    ) -> Result<(), OrchestratorError> {
        self.db.update_payload(id, payload).await?;
        self.db.update_progress(id, processed, total).await?;
        Ok(())
    }

    /// processing -> completed with optional output stats.
    pub async fn complete(
        &self,
        id: JobId,
        output_stats: Option<Value>,
    ) -> Result<(), OrchestratorError> {
        if self.db.complete_job(id, output_stats.as_ref()).await? {
            tracing::info!(job_id = id, "job completed");
            return Ok(());
        }
        match self.db.get_job_status(id).await? {
            None => Err(OrchestratorError::NotFound(id)),
            Some(from) => Err(OrchestratorError::IllegalTransition {
                id,
                action: "complete",
                from,
            }),
        }
    }

    /// Terminal failure from any non-terminal state. Failing an already
    /// terminal job leaves it untouched (the worker may lose a cancel race).
    pub async fn fail(&self, id: JobId, message: &str) -> Result<(), OrchestratorError> {
        if self.db.fail_job(id, message, self.error_log_cap).await? {
            tracing::warn!(job_id = id, message, "job failed");
        } else {
            tracing::debug!(job_id = id, "fail after terminal status ignored");
        }
        Ok(())
    }

    /// Pause a pending or processing job. Pending jobs are evicted from the
    /// broker; processing jobs are flagged and the worker yields at its next
    /// suspension point.
    pub async fn pause(&self, id: JobId, reason: Option<&str>) -> Result<(), OrchestratorError> {
        // One retry absorbs the pending -> processing race with a worker.
        for _ in 0..2 {
            let status = self.status(id).await?;
            match status {
                JobStatus::Pending => {
                    self.broker.remove(self.queue_of(id).await?, id);
                    if self
                        .db
                        .cas_status(id, JobStatus::Pending, JobStatus::Paused)
                        .await?
                    {
                        self.note_control(id, "paused", reason).await?;
                        return Ok(());
                    }
                }
                JobStatus::Processing => {
                    if self
                        .db
                        .cas_status(id, JobStatus::Processing, JobStatus::Paused)
                        .await?
                    {
                        self.control.request_abort(id);
                        self.note_control(id, "paused", reason).await?;
                        return Ok(());
                    }
                }
                from => {
                    return Err(OrchestratorError::IllegalTransition {
                        id,
                        action: "pause",
                        from,
                    })
                }
            }
        }
        let from = self.status(id).await?;
        Err(OrchestratorError::IllegalTransition {
            id,
            action: "pause",
            from,
        })
    }

    /// paused -> pending; clears `completed_at` and re-enqueues with the job
    /// id as the broker key.
    pub async fn resume(&self, id: JobId) -> Result<(), OrchestratorError> {
        if !self
            .db
            .cas_status(id, JobStatus::Paused, JobStatus::Pending)
            .await?
        {
            let from = self.status(id).await?;
            return Err(OrchestratorError::IllegalTransition {
                id,
                action: "resume",
                from,
            });
        }
        let job = self.get(id).await?;
        self.enqueue(&job, EnqueueOpts::default())?;
        tracing::info!(job_id = id, "job resumed");
        Ok(())
    }

    /// Cancel from pending/paused (terminal immediately, broker evicted) or
    /// processing (flagged; the worker yields). Cancelling an already
    /// terminal job is a no-op returning the current status.
    pub async fn cancel(
        &self,
        id: JobId,
        reason: Option<&str>,
    ) -> Result<JobStatus, OrchestratorError> {
        for _ in 0..2 {
            let status = self.status(id).await?;
            match status {
                JobStatus::Pending => {
                    self.broker.remove(self.queue_of(id).await?, id);
                    if self
                        .db
                        .cas_status(id, JobStatus::Pending, JobStatus::Cancelled)
                        .await?
                    {
                        self.note_control(id, "cancelled", reason).await?;
                        return Ok(JobStatus::Cancelled);
                    }
                }
                JobStatus::Paused => {
                    if self
                        .db
                        .cas_status(id, JobStatus::Paused, JobStatus::Cancelled)
                        .await?
                    {
                        self.note_control(id, "cancelled", reason).await?;
                        return Ok(JobStatus::Cancelled);
                    }
                }
                JobStatus::Processing => {
                    if self
                        .db
                        .cas_status(id, JobStatus::Processing, JobStatus::Cancelled)
                        .await?
                    {
                        self.control.request_abort(id);
                        self.note_control(id, "cancelled", reason).await?;
                        return Ok(JobStatus::Cancelled);
                    }
                }
                terminal => return Ok(terminal),
            }
        }
        Ok(self.status(id).await?)
    }

    async fn queue_of(&self, id: JobId) -> Result<crate::queue::QueueName, OrchestratorError> {
        Ok(self.get(id).await?.job_type.queue())
    }

    async fn note_control(
        &self,
        id: JobId,
        what: &str,
        reason: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        if let Some(reason) = reason {
            self.append_error(id, &format!("{what}: {reason}")).await?;
        }
        tracing::info!(job_id = id, "job {}", what);
        Ok(())
    }
}
