//! HTTP-facing error taxonomy.
//!
//! Wraps `charon_types::DomainError` alongside store and data-plane
//! failures and maps each variant to a status code and a stable
//! `snake_case` error code for API consumers.

use crate::logging::sanitize_for_log;
use crate::projection::ProjectionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use charon_types::DomainError;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("data plane unreachable: {0}")]
    DataPlaneUnreachable(String),

    #[error("data plane rejected configuration: {0}")]
    ApplyRejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::DataPlaneUnreachable(msg) => Self::DataPlaneUnreachable(msg),
            ProjectionError::ApplyRejected(msg) => Self::ApplyRejected(sanitize_for_log(&msg)),
            ProjectionError::Store(err) => Self::Store(err),
            ProjectionError::Io(err) => Self::Internal(err.to_string()),
            ProjectionError::Timeout(d) => Self::DataPlaneUnreachable(format!("apply timed out after {d:?}")),
            ProjectionError::ApplyFailed(msg) => Self::DataPlaneUnreachable(sanitize_for_log(&msg)),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Domain(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::DataPlaneUnreachable(_) | Self::ApplyRejected(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Domain(_) => "invalid_domain_value",
            Self::Validation(_) => "validation_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::Store(_) => "store_error",
            Self::DataPlaneUnreachable(_) => "data_plane_unreachable",
            Self::ApplyRejected(_) => "apply_rejected",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.code(), "request failed");
            let body = ErrorBody { error: "internal server error".to_string() };
            return (status, Json(json!(body))).into_response();
        }
        tracing::warn!(error = %self, code = self.code(), "request rejected");
        let body = ErrorBody { error: self.to_string() };
        (status, Json(json!(body))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
