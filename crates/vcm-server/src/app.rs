//! Router assembly and shared application state.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use vcm_core::config::VcmConfig;
use vcm_core::geocode::ProviderRegistry;
use vcm_core::import::ImporterRegistry;
use vcm_core::orchestrator::Orchestrator;

use crate::error::ApiError;
use crate::routes;

/// Shared state handed to every handler. Registries are built once at the
/// composition root and referenced read-only.
pub struct AppState {
    pub orch: Arc<Orchestrator>,
    pub importers: Arc<ImporterRegistry>,
    pub geocoders: Arc<ProviderRegistry>,
    pub config: VcmConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(routes::jobs::create).get(routes::jobs::list))
        .route(
            "/jobs/{id}",
            get(routes::jobs::get_one).delete(routes::jobs::delete_legacy),
        )
        .route("/jobs/{id}/control", post(routes::jobs::control))
        .route("/geocoding-jobs", post(routes::geocoding::create))
        .route(
            "/geocoding-providers",
            get(routes::providers::list).post(routes::providers::create),
        )
        .route(
            "/geocoding-providers/{providerId}",
            axum::routing::patch(routes::providers::update).delete(routes::providers::delete),
        )
        .route("/voter-import-jobs", post(routes::import::create))
        .route("/import-formats", get(routes::import::list_formats))
        .route("/queues", get(routes::queues::counts))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ))
        .with_state(state)
}

/// When an API key is configured, every request must carry it in `X-Api-Key`.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.config.api_key {
        let given = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return ApiError::unauthorized("missing or invalid API key").into_response();
        }
    }
    next.run(req).await
}

/// The acting user, from the `X-User-Id` header the session layer injects.
pub(crate) fn created_by(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("system")
        .to_string()
}
