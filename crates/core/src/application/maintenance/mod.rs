// Maintenance Service
// Scheduled retention GC for finished imports and their source files

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{FileStore, Maintenance, MaintenanceConfig, MaintenanceReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Maintenance scheduler
///
/// Runs periodic maintenance (GC of finished jobs, orphaned source files,
/// VACUUM) in the background
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    file_store: Arc<dyn FileStore>,
    config: MaintenanceConfig,
    interval_hours: u64,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `maintenance` - Database maintenance implementation
    /// * `file_store` - Where orphaned source files are deleted
    /// * `config` - Retention and VACUUM thresholds
    /// * `interval_hours` - How often to run maintenance (hours)
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        file_store: Arc<dyn FileStore>,
        config: MaintenanceConfig,
        interval_hours: u64,
    ) -> Self {
        Self {
            maintenance,
            file_store,
            config,
            interval_hours,
        }
    }

    /// Run maintenance every `interval_hours` until shutdown
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_hours = self.interval_hours,
            retention_days = self.config.finished_job_retention_days,
            "Maintenance scheduler started"
        );

        let period = Duration::from_secs(self.interval_hours.max(1) * 3600);
        while shutdown.sleep(period).await {
            info!("Running scheduled maintenance...");
            if let Err(e) = self.run_now().await {
                error!(error = %e, "Scheduled maintenance failed");
            }
        }
        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately
    pub async fn run_now(&self) -> Result<MaintenanceReport> {
        let report = self.maintenance.run_full_maintenance(&self.config).await?;

        let mut deleted_files = 0;
        for file_ref in &report.gc.orphaned_files {
            match self.file_store.delete(file_ref).await {
                Ok(true) => deleted_files += 1,
                Ok(false) => {}
                Err(e) => warn!(file_ref = %file_ref, error = %e, "Could not delete source file"),
            }
        }

        info!(
            db_size_mb = report.stats.db_size_mb,
            job_count = report.stats.job_count,
            deleted_jobs = report.gc.deleted_jobs,
            deleted_files = deleted_files,
            reclaimed_mb = report.reclaimed_mb,
            "Maintenance run completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::file_store::mocks::InMemoryFileStore;
    use crate::port::{GcReport, MaintenanceStats};
    use async_trait::async_trait;

    struct FakeMaintenance;

    #[async_trait]
    impl Maintenance for FakeMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            Ok(0.0)
        }

        async fn gc_finished_jobs(&self, _retention_days: i64) -> Result<GcReport> {
            Ok(GcReport {
                deleted_jobs: 2,
                orphaned_files: vec!["old-1.csv".to_string(), "gone.csv".to_string()],
            })
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats::default())
        }
    }

    #[tokio::test]
    async fn test_run_now_deletes_orphaned_files() {
        let files = Arc::new(InMemoryFileStore::new());
        files.put("old-1.csv", b"x".to_vec());
        files.put("live.csv", b"y".to_vec());

        let scheduler = MaintenanceScheduler::new(
            Arc::new(FakeMaintenance),
            files.clone(),
            MaintenanceConfig::default(),
            24,
        );
        let report = scheduler.run_now().await.unwrap();

        assert_eq!(report.gc.deleted_jobs, 2);
        assert!(!files.contains("old-1.csv"));
        assert!(files.contains("live.csv"));
    }
}
