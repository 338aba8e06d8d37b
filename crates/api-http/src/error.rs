//! HTTP Error Mapping
//!
//! Every failure leaves as `{ "error": <kind>, "message": <text> }`, where
//! `kind` is the `AppError::kind()` name or one of the HTTP-only kinds below.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog_ingest_core::error::AppError;
use serde::Serialize;
use std::time::Duration;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    /// Malformed request outside the upload contract (bad JSON, bad query)
    #[error("{0}")]
    BadRequest(String),

    #[error("too many uploads, retry in {}s", .0.as_secs().max(1))]
    RateLimited(Duration),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::App(err) => match err {
                AppError::InvalidUpload(_) | AppError::SchemaMismatch(_) => StatusCode::BAD_REQUEST,
                AppError::NotFound(_) => StatusCode::NOT_FOUND,
                AppError::Conflict(_) | AppError::InvalidState(_) | AppError::Domain(_) => {
                    StatusCode::CONFLICT
                }
                AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
                AppError::Persistence(_)
                | AppError::Io(_)
                | AppError::Serialization(_)
                | AppError::Config(_)
                | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::App(err) => err.kind(),
            ApiError::BadRequest(_) => "InvalidRequest",
            ApiError::RateLimited(_) => "RateLimited",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let retry_after = match &self {
            ApiError::RateLimited(wait) => Some(wait.as_secs().max(1)),
            _ => None,
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
