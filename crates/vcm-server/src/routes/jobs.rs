//! Job CRUD and lifecycle control endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use vcm_core::scheduled;
use vcm_core::store::{ErrorEntry, JobFilter, JobRecord, JobStatus, JobType, NewJob};

use crate::app::{created_by, AppState};
use crate::error::{ApiError, ApiResult};

const MAX_LIST_LIMIT: i64 = 200;

/// Wire shape of a job row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: i64,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub is_dynamic: bool,
    pub total_items: i64,
    pub processed_items: i64,
    pub progress: u8,
    pub payload: Value,
    pub error_log: Vec<ErrorEntry>,
    pub output_stats: Option<Value>,
    pub created_by: String,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        Self {
            progress: job.progress_percent(),
            id: job.id,
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            is_dynamic: job.is_dynamic,
            total_items: job.total_items,
            processed_items: job.processed_items,
            payload: job.payload,
            error_log: job.error_log,
            output_stats: job.output_stats,
            created_by: job.created_by,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Validate a caller-supplied job type against what the workers can run.
pub(crate) fn parse_job_type(raw: &str) -> Result<JobType, ApiError> {
    let job_type = JobType::from_str(raw);
    if let JobType::Scheduled(name) = &job_type {
        if !scheduled::is_known_task(name) {
            return Err(ApiError::bad_request(format!("unknown job type {raw:?}")));
        }
    }
    Ok(job_type)
}

fn parse_status(raw: &str) -> Result<JobStatus, ApiError> {
    match raw {
        "pending" | "processing" | "paused" | "completed" | "failed" | "cancelled" => {
            Ok(JobStatus::from_str(raw))
        }
        other => Err(ApiError::bad_request(format!("unknown status {other:?}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub is_dynamic: Option<bool>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let raw_type = body
        .job_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("job type is required"))?;
    let job_type = parse_job_type(raw_type)?;

    let payload = body.data.unwrap_or_else(|| json!({}));
    // Static geocoding payloads carry their work set; seed the total from it.
    let total_items = if body.is_dynamic.unwrap_or(false) {
        None
    } else {
        payload
            .get("householdIds")
            .and_then(Value::as_array)
            .map(|ids| ids.len() as i64)
    };

    let job = state
        .orch
        .create_and_enqueue(NewJob {
            job_type,
            created_by: created_by(&headers),
            payload,
            total_items,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "createdById")]
    pub created_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
    pub total: i64,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let filter = JobFilter {
        job_type: query.job_type,
        status,
        created_by: query.created_by,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let (jobs, total) = state.orch.list(&filter, limit, offset).await?;
    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(JobView::from).collect(),
        total,
    }))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobView>> {
    let job = state.orch.get(id).await?;
    Ok(Json(job.into()))
}

/// Legacy cancel: only valid while the job is still pending.
pub async fn delete_legacy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobView>> {
    let job = state.orch.get(id).await?;
    if job.status != JobStatus::Pending {
        return Err(ApiError::bad_request(format!(
            "only pending jobs can be deleted (status is {})",
            job.status
        )));
    }
    state.orch.cancel(id, Some("deleted via legacy endpoint")).await?;
    let job = state.orch.get(id).await?;
    Ok(Json(job.into()))
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: Option<String>,
}

pub async fn control(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ControlRequest>,
) -> ApiResult<Json<JobView>> {
    match body.action.as_deref() {
        Some("pause") => state.orch.pause(id, None).await?,
        Some("resume") => state.orch.resume(id).await?,
        Some("cancel") => {
            state.orch.cancel(id, None).await?;
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown control action {other:?}"
            )))
        }
    }
    let job = state.orch.get(id).await?;
    Ok(Json(job.into()))
}
