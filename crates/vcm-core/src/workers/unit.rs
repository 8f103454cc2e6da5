//! Per-unit worker protocol: start CAS, handler dispatch, terminal write, ack.

use anyhow::Result;
use std::sync::atomic::AtomicBool;

use crate::geocode;
use crate::import;
use crate::orchestrator::StartOutcome;
use crate::queue::Claimed;
use crate::scheduled;
use crate::store::{JobRecord, JobType};

use super::pool::WorkerEnv;
use super::HandlerOutcome;

pub(super) async fn process_unit(env: &WorkerEnv, worker: &str, unit: Claimed) {
    let orch = &env.orch;
    let job_id = unit.job_key;

    match orch.start(job_id).await {
        Ok(StartOutcome::Started) => {}
        Ok(StartOutcome::AlreadyProcessing) => {
            // Redelivery of a unit another claim is processing.
            orch.broker().ack(unit.release);
            return;
        }
        Err(e) => {
            // Cancelled/paused before we got here, or the row is gone: drop.
            tracing::debug!(job_id, worker, "start refused: {e}");
            orch.broker().ack(unit.release);
            return;
        }
    }

    let job = match orch.get(job_id).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(job_id, worker, "claimed job unreadable: {e}");
            orch.broker().ack(unit.release);
            return;
        }
    };

    let abort = orch.control().register(job_id);
    let outcome = run_handler(env, &job, &abort).await;
    orch.control().unregister(job_id);

    match outcome {
        Ok(HandlerOutcome::Completed(stats)) => {
            if let Err(e) = orch.complete(job_id, stats).await {
                // Lost a cancel race at the finish line; the terminal wins.
                tracing::debug!(job_id, "complete refused: {e}");
            }
        }
        Ok(HandlerOutcome::Yielded) => {
            tracing::debug!(job_id, worker, "handler yielded");
        }
        Err(e) => {
            if let Err(e2) = orch.fail(job_id, &format!("{e:#}")).await {
                tracing::error!(job_id, "recording failure failed: {e2}");
            }
        }
    }

    // Always ack: redelivering a handled unit would only trip the start CAS.
    orch.broker().ack(unit.release);
}

async fn run_handler(
    env: &WorkerEnv,
    job: &JobRecord,
    abort: &AtomicBool,
) -> Result<HandlerOutcome> {
    match &job.job_type {
        JobType::VoterImport => {
            import::run_import_job(
                &env.orch,
                &env.importers,
                env.import_progress_interval,
                job,
                abort,
            )
            .await
        }
        JobType::Geocoding => {
            geocode::run_geocoding_job(&env.orch, &env.geocoders, &env.geocode_settings, job, abort)
                .await
        }
        JobType::Scheduled(task) => {
            scheduled::run_scheduled_job(&env.orch, &env.geocoders, task, job, abort).await
        }
    }
}
