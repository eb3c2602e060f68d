//! HTTP error mapping. Handlers return `Result<_, ApiError>`; the body is
//! always `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollcall_core::accounts::AccountError;
use rollcall_core::annotate::AnnotateError;
use rollcall_core::enrollment::EnrollmentError;
use rollcall_core::{OracleError, PipelineError, StoreError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(key) => Self::Conflict(format!("{key} already exists")),
            StoreError::NotFound(key) => Self::NotFound(format!("{key} not found")),
            StoreError::Backend(msg) => Self::Internal(format!("storage failure: {msg}")),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(e: OracleError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidInput(msg) => Self::BadRequest(msg),
            PipelineError::Oracle(e) => e.into(),
            PipelineError::Store(e) => e.into(),
        }
    }
}

impl From<AnnotateError> for ApiError {
    fn from(e: AnnotateError) -> Self {
        match e {
            AnnotateError::Image(_) => Self::BadRequest("invalid image".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::Store(e) => e.into(),
            EnrollmentError::Io(e) => Self::Internal(e.to_string()),
            EnrollmentError::NotFound(_) => Self::NotFound(e.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::MissingFields => Self::BadRequest(e.to_string()),
            AccountError::EmailTaken => Self::Conflict(e.to_string()),
            AccountError::InvalidCredentials => Self::Unauthorized(e.to_string()),
            AccountError::Hash(msg) => Self::Internal(msg),
            AccountError::Store(e) => e.into(),
        }
    }
}
