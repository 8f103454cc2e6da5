//! Convenience wrapper around `POST /jobs` for geocoding work.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use vcm_core::geocode::payload::{GeocodingJobPayload, MAX_GEOCODE_LIMIT};
use vcm_core::store::{HouseholdFilter, JobType, NewJob};

use crate::app::{created_by, AppState};
use crate::error::{ApiError, ApiResult};
use crate::routes::jobs::JobView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGeocodingJobRequest {
    #[serde(default)]
    pub filters: Option<HouseholdFilter>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub skip_geocoded: Option<bool>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateGeocodingJobRequest>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let db = state.orch.db();
    if !db.any_provider_enabled().await.map_err(ApiError::from)? {
        return Err(ApiError::bad_request(
            "no geocoding providers are configured",
        ));
    }
    if let Some(provider_id) = &body.provider_id {
        let known = db
            .get_provider(provider_id)
            .await
            .map_err(ApiError::from)?
            .is_some();
        if !known {
            return Err(ApiError::bad_request(format!(
                "unknown geocoding provider {provider_id:?}"
            )));
        }
    }

    let filters = body.filters.unwrap_or_default();
    let limit = body
        .limit
        .unwrap_or(MAX_GEOCODE_LIMIT)
        .clamp(1, MAX_GEOCODE_LIMIT);
    let skip_geocoded = body.skip_geocoded.unwrap_or(true);

    let (payload, total_items) = match body.mode.as_deref().unwrap_or("static") {
        "dynamic" => (
            GeocodingJobPayload::dynamic(filters, limit, skip_geocoded, body.provider_id),
            None,
        ),
        "static" => {
            let payload = GeocodingJobPayload::materialise_static(
                db,
                filters,
                limit,
                skip_geocoded,
                body.provider_id,
            )
            .await
            .map_err(ApiError::from)?;
            let total = payload.household_ids.len() as i64;
            (payload, Some(total))
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "mode must be \"static\" or \"dynamic\", got {other:?}"
            )))
        }
    };

    let job = state
        .orch
        .create_and_enqueue(NewJob {
            job_type: JobType::Geocoding,
            created_by: created_by(&headers),
            payload: serde_json::to_value(&payload)
                .map_err(|e| ApiError::internal(e.to_string()))?,
            total_items,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}
