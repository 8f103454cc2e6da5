//! API error type: one JSON error shape plus status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use vcm_core::orchestrator::OrchestratorError;
use vcm_core::store::{DuplicateProviderId, PrimaryDeleteRefused};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match &e {
            OrchestratorError::NotFound(_) => Self::not_found(e.to_string()),
            OrchestratorError::IllegalTransition { .. } => Self::bad_request(e.to_string()),
            OrchestratorError::Internal(_) => {
                tracing::error!("orchestrator error: {e:#}");
                Self::internal("internal error")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if e.downcast_ref::<PrimaryDeleteRefused>().is_some() {
            return Self::conflict(e.to_string());
        }
        if e.downcast_ref::<DuplicateProviderId>().is_some() {
            return Self::conflict(e.to_string());
        }
        tracing::error!("request failed: {e:#}");
        Self::internal("internal error")
    }
}
