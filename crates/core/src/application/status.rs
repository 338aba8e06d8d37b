// Status Query Service - job status, row errors, cancellation, stats

use crate::application::worker::constants::{DEFAULT_ERRORS_PAGE_SIZE, MAX_ERRORS_PAGE_SIZE};
use crate::domain::{DeadLetter, ImportJob, ImportStatus, JobId, Page, RowOutcome};
use crate::error::{AppError, Result};
use crate::port::{JobStore, MessageTransport, TimeProvider, Topology};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Pipeline-wide counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub jobs_by_status: Vec<StatusCount>,
    pub queue_depth: i64,
    pub dead_letters: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: ImportStatus,
    pub count: i64,
}

pub struct ImportQueryService {
    job_store: Arc<dyn JobStore>,
    transport: Arc<dyn MessageTransport>,
    time_provider: Arc<dyn TimeProvider>,
    topology: Topology,
}

impl ImportQueryService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        transport: Arc<dyn MessageTransport>,
        time_provider: Arc<dyn TimeProvider>,
        topology: Topology,
    ) -> Self {
        Self {
            job_store,
            transport,
            time_provider,
            topology,
        }
    }

    pub async fn get_status(&self, job_id: &JobId) -> Result<ImportJob> {
        self.job_store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Invalid and Skipped rows ordered by row number.
    /// `page` is 1-based; `page_size` defaults to 50 and is capped at 500.
    pub async fn list_errors(
        &self,
        job_id: &JobId,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<RowOutcome>> {
        // 404 for unknown jobs rather than an empty page
        self.get_status(job_id).await?;

        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_ERRORS_PAGE_SIZE)
            .clamp(1, MAX_ERRORS_PAGE_SIZE);
        self.job_store.list_errors(job_id, page, page_size).await
    }

    /// Pending | Processing -> Failed with `cancelled: <reason>`.
    /// A running worker notices at its next batch boundary.
    pub async fn cancel(&self, job_id: &JobId, reason: Option<&str>) -> Result<ImportJob> {
        let reason = format!("cancelled: {}", reason.unwrap_or("requested by operator"));
        let now = self.time_provider.now_millis();

        if !self.job_store.fail(job_id, &reason, now).await? {
            let job = self.get_status(job_id).await?;
            return Err(AppError::Conflict(format!(
                "Job {} is already {}",
                job_id, job.status
            )));
        }

        info!(job_id = %job_id, reason = %reason, "Import job cancelled");
        self.get_status(job_id).await
    }

    pub async fn stats(&self) -> Result<ImportStats> {
        let jobs_by_status = self
            .job_store
            .count_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        let queue_depth = self.transport.queue_depth(&self.topology.queue).await?;
        let dead_letters = self
            .transport
            .queue_depth(&self.topology.dead_letter_queue)
            .await?;

        Ok(ImportStats {
            jobs_by_status,
            queue_depth,
            dead_letters,
        })
    }

    pub async fn dead_letters(&self, limit: u32) -> Result<Vec<DeadLetter>> {
        self.transport
            .list_dead_letters(&self.topology.dead_letter_queue, limit)
            .await
    }
}
