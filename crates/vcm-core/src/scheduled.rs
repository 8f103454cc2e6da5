//! Scheduled task vocabulary for the `scheduled` queue.
//!
//! Two maintenance tasks ship today: pruning old terminal job rows and
//! probing provider health. Unknown task names fail the job.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::AtomicBool;

use crate::geocode::ProviderRegistry;
use crate::orchestrator::Orchestrator;
use crate::store::JobRecord;
use crate::workers::HandlerOutcome;

pub const TASK_PRUNE_JOBS: &str = "prune_jobs";
pub const TASK_PROVIDER_HEALTH: &str = "provider_health_check";

/// True for task names the scheduled pool knows how to run. The control
/// plane refuses job creation for anything else.
pub fn is_known_task(name: &str) -> bool {
    matches!(name, TASK_PRUNE_JOBS | TASK_PROVIDER_HEALTH)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PruneJobsPayload {
    older_than_days: i64,
}

impl Default for PruneJobsPayload {
    fn default() -> Self {
        Self { older_than_days: 30 }
    }
}

pub async fn run_scheduled_job(
    orch: &Orchestrator,
    geocoders: &ProviderRegistry,
    task: &str,
    job: &JobRecord,
    _abort: &AtomicBool,
) -> Result<HandlerOutcome> {
    match task {
        TASK_PRUNE_JOBS => {
            let payload: PruneJobsPayload =
                serde_json::from_value(job.payload.clone()).unwrap_or_default();
            let cutoff =
                crate::store::db::unix_timestamp() - payload.older_than_days.max(0) * 86_400;
            let pruned = orch.db().prune_terminal_jobs(cutoff).await?;
            tracing::info!(job_id = job.id, pruned, "pruned terminal jobs");
            Ok(HandlerOutcome::Completed(Some(json!({ "pruned": pruned }))))
        }
        TASK_PROVIDER_HEALTH => {
            let rows = orch.db().list_providers().await?;
            let mut healthy = 0u64;
            let mut unhealthy = 0u64;
            for row in rows.iter().filter(|r| r.is_enabled) {
                match geocoders.resolve(row) {
                    Some(provider) if provider.is_available().await => healthy += 1,
                    _ => {
                        unhealthy += 1;
                        orch.append_error(
                            job.id,
                            &format!("provider {} unavailable", row.provider_id),
                        )
                        .await?;
                    }
                }
            }
            Ok(HandlerOutcome::Completed(Some(json!({
                "healthy": healthy,
                "unhealthy": unhealthy,
            }))))
        }
        other => Err(anyhow!("unknown scheduled task {other:?}")),
    }
}
