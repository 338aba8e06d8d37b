//! Request / Response DTOs (camelCase JSON)

use catalog_ingest_core::domain::{DeadLetter, ImportJob, ImportStatus, OutcomeKind, Page, RowOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub status: ImportStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub error_rows: i64,
    pub file_name: String,
    pub attempt: i32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
}

impl From<ImportJob> for JobResponse {
    fn from(job: ImportJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            error_rows: job.error_rows,
            file_name: job.file_name,
            attempt: job.attempt,
            last_error: job.last_error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowErrorItem {
    pub row_number: i64,
    pub sku: String,
    pub outcome: OutcomeKind,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsResponse {
    pub items: Vec<RowErrorItem>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub has_next: bool,
}

impl From<Page<RowOutcome>> for ErrorsResponse {
    fn from(page: Page<RowOutcome>) -> Self {
        let has_next = page.has_next();
        Self {
            items: page
                .items
                .into_iter()
                .map(|o| RowErrorItem {
                    row_number: o.row_number,
                    sku: o.sku,
                    outcome: o.outcome,
                    detail: o.detail,
                })
                .collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            has_next,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeadLettersQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterResponse {
    pub id: i64,
    pub queue: String,
    pub origin_queue: String,
    pub job_id: String,
    pub source_file_ref: String,
    pub attempt: i32,
    pub dead_lettered_at: i64,
}

impl From<DeadLetter> for DeadLetterResponse {
    fn from(dead: DeadLetter) -> Self {
        Self {
            id: dead.id,
            queue: dead.queue,
            origin_queue: dead.origin_queue,
            job_id: dead.message.job_id,
            source_file_ref: dead.message.source_file_ref,
            attempt: dead.message.attempt,
            dead_lettered_at: dead.dead_lettered_at,
        }
    }
}
