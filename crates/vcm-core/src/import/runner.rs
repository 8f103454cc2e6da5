//! Import job runner: payload decode, re-validation, importer dispatch, and
//! upload-file cleanup once the job terminates.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::orchestrator::Orchestrator;
use crate::store::JobRecord;
use crate::workers::HandlerOutcome;

use super::progress::ProgressReporter;
use super::registry::ImporterRegistry;
use super::types::{ImportRun, ImportType};

/// Opaque payload stored on a voter-import job row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoterImportPayload {
    pub file_path: PathBuf,
    pub format_id: String,
    pub import_type: String,
    #[serde(default)]
    pub original_filename: Option<String>,
}

/// Run one voter-import job to completion or the next yield point.
///
/// There is no import checkpoint: a resumed or recovered import restarts
/// from the file, which is safe for keyed formats (upsert) and may duplicate
/// rows for keyless full imports.
pub async fn run_import_job(
    orch: &Orchestrator,
    registry: &ImporterRegistry,
    progress_interval: u64,
    job: &JobRecord,
    abort: &AtomicBool,
) -> Result<HandlerOutcome> {
    let payload: VoterImportPayload = serde_json::from_value(job.payload.clone())
        .map_err(|e| anyhow!("invalid voter-import payload: {e}"))?;

    // Re-check what the API validated at upload time; the registry may have
    // changed between enqueue and claim. These errors are fatal, so the
    // upload is removed on the way out.
    let checked = ImportType::parse(&payload.import_type)
        .ok_or_else(|| anyhow!("unknown import type {:?}", payload.import_type))
        .and_then(|import_type| {
            registry
                .validate(&payload.format_id, &payload.file_path, import_type)
                .map(|importer| (importer, import_type))
                .map_err(|e| anyhow!(e))
        });
    let (importer, import_type) = match checked {
        Ok(found) => found,
        Err(e) => {
            remove_upload(&payload.file_path).await;
            return Err(e);
        }
    };

    if !payload.file_path.exists() {
        return Err(anyhow!(
            "upload file missing: {}",
            payload.file_path.display()
        ));
    }

    // A restarted import begins over; reset the visible counter.
    orch.update_progress(job.id, 0, None).await?;

    let report = ProgressReporter::new(orch, job.id, progress_interval);
    let run = importer
        .import(orch.db(), &payload.file_path, import_type, &report, abort)
        .await;

    match run {
        Ok(ImportRun::Finished(result)) => {
            orch.update_progress(
                job.id,
                result.processed as i64,
                Some(result.processed as i64),
            )
            .await?;
            remove_upload(&payload.file_path).await;
            Ok(HandlerOutcome::Completed(Some(result.to_stats())))
        }
        Ok(ImportRun::Yielded) => {
            // Paused jobs keep the file so resume can restart from it;
            // a cancel observed mid-file is terminal and the file goes away.
            let status = orch.status(job.id).await?;
            if status.is_terminal() {
                remove_upload(&payload.file_path).await;
            }
            Ok(HandlerOutcome::Yielded)
        }
        Err(e) => {
            // The worker fails the job right after this, which is terminal.
            remove_upload(&payload.file_path).await;
            Err(e)
        }
    }
}

async fn remove_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), "upload cleanup failed: {e}");
    }
}
