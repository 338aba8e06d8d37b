// SQLite JobStore Implementation
//
// Every status change is a single UPDATE guarded by the expected status, so
// the row itself arbitrates between competing workers. Owner writes are also
// guarded by the claimed attempt.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use catalog_ingest_core::domain::{
    BatchProgress, ImportJob, ImportStatus, JobId, OutcomeKind, Page, RowOutcome,
};
use catalog_ingest_core::error::Result;
use catalog_ingest_core::port::JobStore;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

/// Rows per multi-row INSERT (5 bind parameters each)
const OUTCOME_INSERT_CHUNK: usize = 100;

const STALE_RESET_REASON: &str = "liveness threshold exceeded";

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &ImportJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                id, status, total_rows, processed_rows, error_rows,
                created_at, updated_at, finished_at,
                source_file_ref, file_name, attempt, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(job.total_rows)
        .bind(job.processed_rows)
        .bind(job.error_rows)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.finished_at)
        .bind(&job.source_file_ref)
        .bind(&job.file_name)
        .bind(job.attempt)
        .bind(&job.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, ImportJobRow>("SELECT * FROM import_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ImportJobRow::into_job).transpose()
    }

    async fn try_claim(&self, id: &JobId, attempt: i32, now_millis: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, attempt = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(ImportStatus::Processing.as_str())
        .bind(attempt)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_batch(
        &self,
        id: &JobId,
        attempt: i32,
        progress: BatchProgress,
        outcomes: &[RowOutcome],
        now_millis: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let advanced = sqlx::query(
            r#"
            UPDATE import_jobs
            SET processed_rows = processed_rows + ?,
                error_rows = error_rows + ?,
                updated_at = ?
            WHERE id = ? AND status = ? AND attempt = ?
            "#,
        )
        .bind(progress.processed)
        .bind(progress.errors)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Processing.as_str())
        .bind(attempt)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        }

        for chunk in outcomes.chunks(OUTCOME_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO row_outcomes (job_id, row_number, sku, outcome, detail) ",
            );
            builder.push_values(chunk, |mut row, outcome| {
                row.push_bind(&outcome.job_id)
                    .push_bind(outcome.row_number)
                    .push_bind(&outcome.sku)
                    .push_bind(outcome.outcome.as_str())
                    .push_bind(&outcome.detail);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    async fn finish(
        &self,
        id: &JobId,
        attempt: i32,
        now_millis: i64,
    ) -> Result<Option<ImportStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE import_jobs
            SET status = CASE WHEN error_rows = 0 THEN ? ELSE ? END,
                total_rows = processed_rows,
                updated_at = ?,
                finished_at = ?
            WHERE id = ? AND status = ? AND attempt = ?
            RETURNING status
            "#,
        )
        .bind(ImportStatus::Completed.as_str())
        .bind(ImportStatus::CompletedWithErrors.as_str())
        .bind(now_millis)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Processing.as_str())
        .bind(attempt)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(status.map(|s| s.parse::<ImportStatus>()).transpose()?)
    }

    async fn release(
        &self,
        id: &JobId,
        attempt: i32,
        error: &str,
        now_millis: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, last_error = ?, updated_at = ?
            WHERE id = ? AND status = ? AND attempt = ?
            "#,
        )
        .bind(ImportStatus::Pending.as_str())
        .bind(error)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Processing.as_str())
        .bind(attempt)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, id: &JobId, reason: &str, now_millis: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, last_error = ?, updated_at = ?, finished_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(ImportStatus::Failed.as_str())
        .bind(reason)
        .bind(now_millis)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Pending.as_str())
        .bind(ImportStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_stale(&self, updated_before: i64) -> Result<Vec<ImportJob>> {
        let rows = sqlx::query_as::<_, ImportJobRow>(
            r#"
            SELECT * FROM import_jobs
            WHERE status = ? AND updated_at < ?
            ORDER BY updated_at ASC
            "#,
        )
        .bind(ImportStatus::Processing.as_str())
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ImportJobRow::into_job).collect()
    }

    async fn reset_stale(
        &self,
        id: &JobId,
        observed_updated_at: i64,
        now_millis: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, last_error = ?, updated_at = ?
            WHERE id = ? AND status = ? AND updated_at = ?
            "#,
        )
        .bind(ImportStatus::Pending.as_str())
        .bind(STALE_RESET_REASON)
        .bind(now_millis)
        .bind(id)
        .bind(ImportStatus::Processing.as_str())
        .bind(observed_updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_errors(
        &self,
        id: &JobId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RowOutcome>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM row_outcomes WHERE job_id = ? AND outcome IN (?, ?)",
        )
        .bind(id)
        .bind(OutcomeKind::Invalid.as_str())
        .bind(OutcomeKind::Skipped.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query_as::<_, RowOutcomeRow>(
            r#"
            SELECT job_id, row_number, sku, outcome, detail
            FROM row_outcomes
            WHERE job_id = ? AND outcome IN (?, ?)
            ORDER BY row_number ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(id)
        .bind(OutcomeKind::Invalid.as_str())
        .bind(OutcomeKind::Skipped.as_str())
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let items = rows
            .into_iter()
            .map(RowOutcomeRow::into_outcome)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    async fn count_by_status(&self) -> Result<Vec<(ImportStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM import_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts: HashMap<ImportStatus, i64> = HashMap::new();
        for (status, count) in rows {
            counts.insert(status.parse()?, count);
        }
        Ok(ImportStatus::ALL
            .into_iter()
            .map(|status| (status, counts.get(&status).copied().unwrap_or(0)))
            .collect())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ImportJobRow {
    id: String,
    status: String,
    total_rows: i64,
    processed_rows: i64,
    error_rows: i64,
    created_at: i64,
    updated_at: i64,
    finished_at: Option<i64>,
    source_file_ref: String,
    file_name: String,
    attempt: i32,
    last_error: Option<String>,
}

impl ImportJobRow {
    fn into_job(self) -> Result<ImportJob> {
        Ok(ImportJob {
            id: self.id,
            status: self.status.parse()?,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            error_rows: self.error_rows,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
            source_file_ref: self.source_file_ref,
            file_name: self.file_name,
            attempt: self.attempt,
            last_error: self.last_error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RowOutcomeRow {
    job_id: String,
    row_number: i64,
    sku: String,
    outcome: String,
    detail: Option<String>,
}

impl RowOutcomeRow {
    fn into_outcome(self) -> Result<RowOutcome> {
        Ok(RowOutcome {
            job_id: self.job_id,
            row_number: self.row_number,
            sku: self.sku,
            outcome: self.outcome.parse()?,
            detail: self.detail,
        })
    }
}
