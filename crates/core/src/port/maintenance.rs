// DB Maintenance port
use crate::domain::SourceFileRef;
use crate::error::Result;
use async_trait::async_trait;

/// Database maintenance statistics
#[derive(Debug, Clone, Default)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_count: i64,
    pub finished_job_count: i64,
    pub row_outcome_count: i64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Retention period for terminal jobs and their row outcomes (days)
    pub finished_job_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            finished_job_retention_days: 7,
            max_db_size_mb: 1000.0,
        }
    }
}

/// What a garbage-collection pass removed
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    pub deleted_jobs: i64,
    /// Source files no remaining job references; safe to delete
    pub orphaned_files: Vec<SourceFileRef>,
}

/// Outcome of a full maintenance run
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub stats: MaintenanceStats,
    pub gc: GcReport,
    pub reclaimed_mb: f64,
}

/// Database maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Delete terminal jobs finished before the retention window, with their
    /// row outcomes
    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<GcReport>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<MaintenanceStats>;

    /// Run full maintenance (GC + VACUUM when the DB is large)
    async fn run_full_maintenance(&self, config: &MaintenanceConfig) -> Result<MaintenanceReport> {
        let stats_before = self.get_stats().await?;

        let gc = self
            .gc_finished_jobs(config.finished_job_retention_days)
            .await?;

        let reclaimed_mb = if stats_before.db_size_mb > config.max_db_size_mb {
            self.vacuum().await?
        } else {
            0.0
        };

        let stats = self.get_stats().await?;

        tracing::info!(
            deleted_jobs = gc.deleted_jobs,
            orphaned_files = gc.orphaned_files.len(),
            reclaimed_mb = reclaimed_mb,
            db_size_mb = stats.db_size_mb,
            "Maintenance completed"
        );

        Ok(MaintenanceReport {
            stats,
            gc,
            reclaimed_mb,
        })
    }
}
