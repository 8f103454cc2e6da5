//! Startup recovery: reconcile durable job state with the in-memory broker.
//!
//! The broker loses everything on process death. Every pending/processing
//! row is re-enqueued keyed by its job id; processing rows are normalised
//! back to pending so the start CAS fires again and the handler resumes from
//! its saved checkpoint. Rows the process no longer understands fail with a
//! recovery-time message.

use anyhow::Result;

use crate::geocode::GeocodingJobPayload;
use crate::import::VoterImportPayload;
use crate::orchestrator::Orchestrator;
use crate::queue::EnqueueOpts;
use crate::scheduled;
use crate::store::{JobRecord, JobStatus, JobType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

enum Verdict {
    Resumable,
    Unknown,
    Malformed(String),
}

fn classify(job: &JobRecord) -> Verdict {
    match &job.job_type {
        JobType::VoterImport => {
            match serde_json::from_value::<VoterImportPayload>(job.payload.clone()) {
                Ok(_) => Verdict::Resumable,
                Err(e) => Verdict::Malformed(e.to_string()),
            }
        }
        JobType::Geocoding => {
            match serde_json::from_value::<GeocodingJobPayload>(job.payload.clone()) {
                Ok(_) => Verdict::Resumable,
                Err(e) => Verdict::Malformed(e.to_string()),
            }
        }
        JobType::Scheduled(name) => {
            if scheduled::is_known_task(name) {
                Verdict::Resumable
            } else {
                Verdict::Unknown
            }
        }
    }
}

/// Scan the store for non-terminal jobs and hand them back to the broker.
/// Call once at process startup, before the worker pools spin up.
pub async fn recover_and_requeue(orch: &Orchestrator) -> Result<RecoveryReport> {
    let jobs = orch.db().list_active_jobs().await?;
    let mut report = RecoveryReport::default();

    for job in jobs {
        match classify(&job) {
            Verdict::Unknown => {
                orch.fail(
                    job.id,
                    &format!("startup recovery: unknown job type {:?}", job.job_type.as_str()),
                )
                .await?;
                report.failed += 1;
                continue;
            }
            Verdict::Malformed(e) => {
                orch.fail(job.id, &format!("startup recovery: malformed payload: {e}"))
                    .await?;
                report.failed += 1;
                continue;
            }
            Verdict::Resumable => {}
        }

        if job.status == JobStatus::Processing {
            // The worker that held this claim is gone; make the CAS arm again.
            if !orch
                .db()
                .cas_status(job.id, JobStatus::Processing, JobStatus::Pending)
                .await?
            {
                continue;
            }
        }
        orch.enqueue(&job, EnqueueOpts::default())?;
        report.requeued += 1;
        tracing::info!(job_id = job.id, "job requeued after restart");
    }

    if report.requeued > 0 || report.failed > 0 {
        tracing::info!(
            requeued = report.requeued,
            failed = report.failed,
            "startup recovery complete"
        );
    }
    Ok(report)
}
