//! Route handlers

use crate::error::{ApiError, ApiResult};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelRequest, DeadLetterResponse, DeadLettersQuery, ErrorsQuery, ErrorsResponse,
    JobResponse, SubmitResponse,
};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalog_ingest_core::application::worker::constants::DEFAULT_DEAD_LETTER_LIMIT;
use catalog_ingest_core::application::{ImportQueryService, ImportStats, IngestionGateway, Upload};
use catalog_ingest_core::error::AppError;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";
const MAX_DEAD_LETTER_LIMIT: u32 = 1000;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<IngestionGateway>,
    pub queries: Arc<ImportQueryService>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// POST /imports
pub async fn submit_import(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    state
        .rate_limiter
        .try_acquire()
        .map_err(ApiError::RateLimited)?;

    let mut multipart =
        multipart.map_err(|e| AppError::InvalidUpload(format!("expected multipart/form-data: {}", e)))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidUpload(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let body = field.map_err(std::io::Error::other).boxed();

        let job_id = state
            .gateway
            .submit(Upload {
                file_name,
                content_type,
                body,
            })
            .await?;

        return Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })));
    }

    Err(AppError::InvalidUpload(format!("missing multipart field `{}`", UPLOAD_FIELD)).into())
}

/// GET /imports/:id
pub async fn get_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.queries.get_status(&id).await?;
    Ok(Json(job.into()))
}

/// GET /imports/:id/errors?page=&pageSize=
pub async fn list_import_errors(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ErrorsQuery>,
) -> ApiResult<Json<ErrorsResponse>> {
    let page = state
        .queries
        .list_errors(&id, query.page, query.page_size)
        .await?;
    Ok(Json(page.into()))
}

/// POST /imports/:id/cancel with an optional `{"reason": ...}` body
pub async fn cancel_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<JobResponse>> {
    let request: CancelRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid cancel body: {}", e)))?
    };

    let job = state.queries.cancel(&id, request.reason.as_deref()).await?;
    Ok(Json(job.into()))
}

/// GET /admin/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<ImportStats>> {
    Ok(Json(state.queries.stats().await?))
}

/// GET /admin/dead-letters?limit=
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLettersQuery>,
) -> ApiResult<Json<Vec<DeadLetterResponse>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .clamp(1, MAX_DEAD_LETTER_LIMIT);
    let dead = state.queries.dead_letters(limit).await?;
    Ok(Json(dead.into_iter().map(DeadLetterResponse::from).collect()))
}

/// POST /admin/dead-letters/:id/replay
pub async fn replay_dead_letter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let job_id = state.gateway.replay_dead_letter(id).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
