//! Voter-import upload endpoint: store the file, validate, create, enqueue.

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use vcm_core::import::{ImportType, VoterImportPayload};
use vcm_core::store::{db::unix_timestamp_millis, JobType, NewJob};

use crate::app::{created_by, AppState};
use crate::error::{ApiError, ApiResult};

/// Strip path components and anything outside `[A-Za-z0-9._-]` so uploads
/// cannot escape the upload directory.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['_', '.']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccepted {
    pub job_id: i64,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ImportAccepted>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut format_id: Option<String> = None;
    let mut import_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("unreadable upload: {e}")))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("format") => {
                format_id = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("unreadable format field: {e}"))
                })?);
            }
            Some("importType") => {
                import_type = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("unreadable importType field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let (original_name, bytes) =
        file.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let format_id = format_id.ok_or_else(|| ApiError::bad_request("format field is required"))?;
    let import_type_raw = import_type.unwrap_or_else(|| "full".to_string());
    let import_type = ImportType::parse(&import_type_raw)
        .ok_or_else(|| ApiError::bad_request(format!("unknown import type {import_type_raw:?}")))?;

    state
        .importers
        .validate(&format_id, Path::new(&original_name), import_type)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    // `{upload_dir}/{unixMillis}_{sanitisedFilename}`
    let upload_dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::internal(format!("upload dir: {e}")))?;
    let stored = upload_dir.join(format!(
        "{}_{}",
        unix_timestamp_millis(),
        sanitize_filename(&original_name)
    ));
    tokio::fs::write(&stored, &bytes)
        .await
        .map_err(|e| ApiError::internal(format!("storing upload: {e}")))?;

    let payload = VoterImportPayload {
        file_path: stored.clone(),
        format_id,
        import_type: import_type.as_str().to_string(),
        original_filename: Some(original_name),
    };
    let job = state
        .orch
        .create(NewJob {
            job_type: JobType::VoterImport,
            created_by: created_by(&headers),
            payload: serde_json::to_value(&payload)
                .map_err(|e| ApiError::internal(e.to_string()))?,
            total_items: None,
        })
        .await?;

    if let Err(e) = state.orch.enqueue(&job, Default::default()) {
        // The job cannot run without a broker unit; undo the upload.
        let _ = tokio::fs::remove_file(&stored).await;
        state.orch.cancel(job.id, Some("broker enqueue failed")).await?;
        tracing::error!(job_id = job.id, "enqueue failed: {e}");
        return Err(ApiError::internal("failed to enqueue import job"));
    }

    Ok((StatusCode::ACCEPTED, Json(ImportAccepted { job_id: job.id })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatView {
    pub format_id: String,
    pub format_name: String,
    pub supported_extensions: Vec<String>,
    pub supports_incremental: bool,
}

pub async fn list_formats(State(state): State<Arc<AppState>>) -> Json<Vec<FormatView>> {
    let formats = state
        .importers
        .descriptors()
        .into_iter()
        .map(|d| FormatView {
            format_id: d.format_id.to_string(),
            format_name: d.format_name.to_string(),
            supported_extensions: d
                .supported_extensions
                .iter()
                .map(|e| e.to_string())
                .collect(),
            supports_incremental: d.supports_incremental,
        })
        .collect();
    Json(formats)
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("voters.csv"), "voters.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\roll 2024.tsv"),
            "roll_2024.tsv"
        );
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }
}
