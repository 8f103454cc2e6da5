//! The geocoding pipeline: one job at a time, fixed-size batches, durable
//! checkpoints, pause/cancel observation, and provider fallback.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::VcmConfig;
use crate::orchestrator::Orchestrator;
use crate::retry::{run_with_retry, CallError, RetryPolicy};
use crate::store::{JobId, JobRecord, JobStatus};
use crate::workers::HandlerOutcome;

use super::payload::GeocodingJobPayload;
use super::provider::{GeocodeProvider, GeocodeRequest};
use super::registry::ProviderRegistry;

/// Pipeline tuning, sourced from persisted configuration.
#[derive(Debug, Clone)]
pub struct GeocodeSettings {
    pub batch_size: usize,
    pub call_timeout: Duration,
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
}

impl GeocodeSettings {
    pub fn from_config(cfg: &VcmConfig) -> Self {
        Self {
            batch_size: cfg.geocode_batch_size.max(1),
            call_timeout: Duration::from_secs(cfg.geocode_call_timeout_secs),
            batch_delay: Duration::from_millis(cfg.geocode_batch_delay_ms),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self::from_config(&VcmConfig::default())
    }
}

enum UnitOutcome {
    Success,
    Failure,
}

/// Run one geocoding job to completion or the next yield point.
///
/// The work set is either the payload's pre-materialised id list (static,
/// resuming from the checkpoint index) or a fresh query under the filters
/// (dynamic; `skip_geocoded` keeps resumption from re-geocoding). The
/// checkpoint is rewritten after every batch, so a killed worker loses at
/// most one batch of progress.
pub async fn run_geocoding_job(
    orch: &Orchestrator,
    registry: &ProviderRegistry,
    settings: &GeocodeSettings,
    job: &JobRecord,
    abort: &AtomicBool,
) -> Result<HandlerOutcome> {
    let mut payload: GeocodingJobPayload = serde_json::from_value(job.payload.clone())
        .map_err(|e| anyhow!("invalid geocoding payload: {e}"))?;
    let db = orch.db();

    let rows = db.list_providers().await?;
    let provider = registry
        .select_available(&rows, payload.provider_id.as_deref())
        .await
        .ok_or_else(|| anyhow!("no geocoding provider available"))?;
    tracing::info!(
        job_id = job.id,
        provider = provider.provider_id(),
        "geocoding started"
    );

    let (ids, start) = if payload.dynamic {
        let ids = db
            .query_household_ids(&payload.filters, payload.skip_geocoded, payload.limit)
            .await?;
        (ids, 0usize)
    } else {
        (payload.household_ids.clone(), payload.checkpoint_index)
    };
    let total = if payload.dynamic {
        None
    } else {
        Some(ids.len() as i64)
    };

    let mut processed = payload.checkpoint_index as i64;
    let mut failed = payload.failed_household_ids.clone();
    let mut success = (processed - failed.len() as i64).max(0);

    let mut idx = start;
    loop {
        // Suspension point: the durable status decides whether to continue.
        match orch.status(job.id).await? {
            JobStatus::Processing => {}
            status => {
                tracing::info!(job_id = job.id, %status, "yielding at batch boundary");
                return Ok(HandlerOutcome::Yielded);
            }
        }
        if idx >= ids.len() {
            break;
        }

        let end = (idx + settings.batch_size).min(ids.len());
        let mut aborted = false;
        while idx < end {
            if abort.load(Ordering::Relaxed) {
                aborted = true;
                break;
            }
            let hh_id = ids[idx];
            match geocode_one(orch, provider.as_ref(), settings, job.id, hh_id, abort).await? {
                UnitOutcome::Success => {
                    success += 1;
                    // A retry after resume may clear an earlier failure.
                    failed.retain(|f| *f != hh_id);
                }
                UnitOutcome::Failure => {
                    if !failed.contains(&hh_id) {
                        failed.push(hh_id);
                    }
                }
            }
            processed += 1;
            idx += 1;
        }

        // Checkpoint after each (possibly partial) batch.
        payload.checkpoint_index = if payload.dynamic {
            processed as usize
        } else {
            idx
        };
        payload.failed_household_ids = failed.clone();
        orch.checkpoint(job.id, &serde_json::to_value(&payload)?, processed, total)
            .await?;

        if !aborted && idx < ids.len() {
            // Inter-batch delay keeps the pipeline polite to the provider.
            tokio::time::sleep(settings.batch_delay).await;
        }
    }

    let stats = json!({
        "processedCount": processed,
        "successCount": success,
        "failureCount": failed.len(),
    });
    Ok(HandlerOutcome::Completed(Some(stats)))
}

/// Geocode one household: build the address, call the provider under the
/// per-call timeout and retry policy, and persist the result. Unit failures
/// are logged and counted, never raised.
async fn geocode_one(
    orch: &Orchestrator,
    provider: &dyn GeocodeProvider,
    settings: &GeocodeSettings,
    job_id: JobId,
    hh_id: i64,
    abort: &AtomicBool,
) -> Result<UnitOutcome> {
    let db = orch.db();
    let Some(hh) = db.get_household(hh_id).await? else {
        orch.append_error(job_id, &format!("household {hh_id} no longer exists"))
            .await?;
        return Ok(UnitOutcome::Failure);
    };
    let req = GeocodeRequest::from_household(&hh);
    if req.is_empty() {
        orch.append_error(job_id, &format!("household {hh_id}: empty address"))
            .await?;
        return Ok(UnitOutcome::Failure);
    }

    let result = run_with_retry(&settings.retry, abort, || {
        let req = req.clone();
        async move {
            match tokio::time::timeout(settings.call_timeout, provider.geocode(&req)).await {
                Ok(res) => res,
                Err(_) => Err(CallError::Timeout),
            }
        }
    })
    .await;

    match result {
        Ok(Some(found)) => {
            db.mark_geocoded(hh_id, found.latitude, found.longitude, &found.source)
                .await?;
            Ok(UnitOutcome::Success)
        }
        Ok(None) => {
            orch.append_error(
                job_id,
                &format!("household {hh_id}: no match for {}", req.one_line()),
            )
            .await?;
            Ok(UnitOutcome::Failure)
        }
        Err(e) => {
            orch.append_error(job_id, &format!("household {hh_id}: {e}"))
                .await?;
            Ok(UnitOutcome::Failure)
        }
    }
}
