//! Geocoding provider configuration surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use vcm_core::store::{NewProvider, ProviderRow, ProviderUpdate};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub provider_id: String,
    pub provider_name: String,
    pub is_enabled: bool,
    pub is_primary: bool,
    pub priority: i64,
    pub config: Value,
}

impl From<ProviderRow> for ProviderView {
    fn from(row: ProviderRow) -> Self {
        Self {
            provider_id: row.provider_id,
            provider_name: row.provider_name,
            is_enabled: row.is_enabled,
            is_primary: row.is_primary,
            priority: row.priority,
            config: row.config,
        }
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ProviderView>>> {
    let rows = state.orch.db().list_providers().await?;
    Ok(Json(rows.into_iter().map(ProviderView::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub is_primary: Option<bool>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub config: Option<Value>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProviderRequest>,
) -> ApiResult<(StatusCode, Json<ProviderView>)> {
    let provider_id = body
        .provider_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("providerId is required"))?;
    let provider_name = body
        .provider_name
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| provider_id.clone());

    let new = NewProvider {
        provider_id: provider_id.clone(),
        provider_name,
        is_enabled: body.is_enabled.unwrap_or(true),
        is_primary: body.is_primary.unwrap_or(false),
        priority: body.priority.unwrap_or(100),
        config: body.config.unwrap_or_else(|| json!({})),
    };
    state.orch.db().insert_provider(&new).await?;

    let row = state
        .orch
        .db()
        .get_provider(&provider_id)
        .await?
        .ok_or_else(|| ApiError::internal("provider vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderRequest {
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub is_primary: Option<bool>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub config: Option<Value>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    Json(body): Json<UpdateProviderRequest>,
) -> ApiResult<Json<ProviderView>> {
    let update = ProviderUpdate {
        provider_name: body.provider_name,
        is_enabled: body.is_enabled,
        is_primary: body.is_primary,
        priority: body.priority,
        config: body.config,
    };
    let row = state
        .orch
        .db()
        .update_provider(&provider_id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("provider {provider_id:?} not found")))?;
    Ok(Json(row.into()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state.orch.db().delete_provider(&provider_id).await?;
    if !deleted {
        return Err(ApiError::not_found(format!(
            "provider {provider_id:?} not found"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
