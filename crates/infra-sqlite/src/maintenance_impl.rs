// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use catalog_ingest_core::domain::ImportStatus;
use catalog_ingest_core::error::Result;
use catalog_ingest_core::port::{GcReport, Maintenance, MaintenanceStats, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

const TERMINAL: [ImportStatus; 3] = [
    ImportStatus::Completed,
    ImportStatus::CompletedWithErrors,
    ImportStatus::Failed,
];

pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn db_size_bytes(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(page_count * page_size)
    }
}

fn to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM...");
        let before = self.db_size_bytes().await?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let after = self.db_size_bytes().await?;
        let reclaimed = to_mb(before - after).max(0.0);
        info!(
            size_before_mb = to_mb(before),
            size_after_mb = to_mb(after),
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );
        Ok(reclaimed)
    }

    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<GcReport> {
        let cutoff = self.time_provider.now_millis() - retention_days * DAY_MILLIS;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Explicit delete keeps the GC correct even without foreign_keys
        sqlx::query(
            r#"
            DELETE FROM row_outcomes WHERE job_id IN (
                SELECT id FROM import_jobs
                WHERE status IN (?, ?, ?) AND finished_at IS NOT NULL AND finished_at < ?
            )
            "#,
        )
        .bind(TERMINAL[0].as_str())
        .bind(TERMINAL[1].as_str())
        .bind(TERMINAL[2].as_str())
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut refs: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM import_jobs
            WHERE status IN (?, ?, ?) AND finished_at IS NOT NULL AND finished_at < ?
            RETURNING source_file_ref
            "#,
        )
        .bind(TERMINAL[0].as_str())
        .bind(TERMINAL[1].as_str())
        .bind(TERMINAL[2].as_str())
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let deleted_jobs = refs.len() as i64;
        refs.sort();
        refs.dedup();

        // A replayed job shares its source file with the job it replaced
        let mut orphaned_files = Vec::with_capacity(refs.len());
        for file_ref in refs {
            let still_used: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs WHERE source_file_ref = ?")
                    .bind(&file_ref)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
            if still_used == 0 {
                orphaned_files.push(file_ref);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(
            retention_days = retention_days,
            cutoff = cutoff,
            deleted_jobs = deleted_jobs,
            orphaned_files = orphaned_files.len(),
            "Finished job GC completed"
        );
        Ok(GcReport {
            deleted_jobs,
            orphaned_files,
        })
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.db_size_bytes().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let finished_job_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs WHERE status IN (?, ?, ?)")
                .bind(TERMINAL[0].as_str())
                .bind(TERMINAL[1].as_str())
                .bind(TERMINAL[2].as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let row_outcome_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM row_outcomes")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(MaintenanceStats {
            db_size_mb: to_mb(db_size_bytes),
            db_size_bytes,
            job_count,
            finished_job_count,
            row_outcome_count,
        })
    }
}
