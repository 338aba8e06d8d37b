// Job Store Port (Interface)
//
// Every status change is conditional on the current status so two workers
// can never both own a job. Updates made by the owning worker are also
// conditional on the claimed attempt: once the liveness sweep hands a job to
// a new attempt, the stalled owner's writes are refused.

use crate::domain::{BatchProgress, ImportJob, ImportStatus, JobId, Page, RowOutcome};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for ImportJob persistence
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &ImportJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<ImportJob>>;

    /// Pending -> Processing. Returns false when the job is not Pending.
    async fn try_claim(&self, id: &JobId, attempt: i32, now_millis: i64) -> Result<bool>;

    /// Advance counters and append outcomes in one transaction.
    /// Returns false (and writes nothing) when the job is no longer
    /// Processing under `attempt`.
    async fn record_batch(
        &self,
        id: &JobId,
        attempt: i32,
        progress: BatchProgress,
        outcomes: &[RowOutcome],
        now_millis: i64,
    ) -> Result<bool>;

    /// Processing -> Completed | CompletedWithErrors, fixing total_rows.
    /// Returns None when the job is no longer Processing under `attempt`.
    async fn finish(&self, id: &JobId, attempt: i32, now_millis: i64)
        -> Result<Option<ImportStatus>>;

    /// Processing -> Pending, recording the error that caused the release.
    /// Only the owner of `attempt` may release.
    async fn release(&self, id: &JobId, attempt: i32, error: &str, now_millis: i64)
        -> Result<bool>;

    /// Pending | Processing -> Failed
    async fn fail(&self, id: &JobId, reason: &str, now_millis: i64) -> Result<bool>;

    /// Processing jobs whose updated_at is older than the cutoff
    async fn find_stale(&self, updated_before: i64) -> Result<Vec<ImportJob>>;

    /// Processing -> Pending, only if updated_at still equals the observed value
    async fn reset_stale(&self, id: &JobId, observed_updated_at: i64, now_millis: i64)
        -> Result<bool>;

    /// Invalid and Skipped outcomes, ordered by row number (page is 1-based)
    async fn list_errors(&self, id: &JobId, page: u32, page_size: u32)
        -> Result<Page<RowOutcome>>;

    /// Job counts per status
    async fn count_by_status(&self) -> Result<Vec<(ImportStatus, i64)>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory JobStore; a single mutex gives the same atomicity as the
    /// conditional SQL updates of the real store.
    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<JobId, ImportJob>>,
        outcomes: Mutex<Vec<RowOutcome>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// All outcomes recorded for a job, in insertion order
        pub fn outcomes(&self, id: &str) -> Vec<RowOutcome> {
            self.outcomes
                .lock()
                .unwrap()
                .iter()
                .filter(|o| o.job_id == id)
                .cloned()
                .collect()
        }

        /// Overwrite a stored job (test setup only)
        pub fn put(&self, job: ImportJob) {
            self.jobs.lock().unwrap().insert(job.id.clone(), job);
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &ImportJob) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(crate::error::AppError::Conflict(format!(
                    "Job {} already exists",
                    job.id
                )));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<ImportJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn try_claim(&self, id: &JobId, attempt: i32, now_millis: i64) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(match jobs.get_mut(id) {
                Some(job) => job.claim(attempt, now_millis).is_ok(),
                None => false,
            })
        }

        async fn record_batch(
            &self,
            id: &JobId,
            attempt: i32,
            progress: BatchProgress,
            outcomes: &[RowOutcome],
            now_millis: i64,
        ) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(id).filter(|job| job.attempt == attempt) else {
                return Ok(false);
            };
            if job.record_batch(progress, now_millis).is_err() {
                return Ok(false);
            }
            self.outcomes
                .lock()
                .unwrap()
                .extend(outcomes.iter().cloned());
            Ok(true)
        }

        async fn finish(
            &self,
            id: &JobId,
            attempt: i32,
            now_millis: i64,
        ) -> Result<Option<ImportStatus>> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .get_mut(id)
                .filter(|job| job.attempt == attempt)
                .and_then(|job| job.finish(now_millis).ok()))
        }

        async fn release(
            &self,
            id: &JobId,
            attempt: i32,
            error: &str,
            now_millis: i64,
        ) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(match jobs.get_mut(id) {
                Some(job) if job.attempt == attempt => job.release(error, now_millis).is_ok(),
                _ => false,
            })
        }

        async fn fail(&self, id: &JobId, reason: &str, now_millis: i64) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(match jobs.get_mut(id) {
                Some(job) => job.fail(reason, now_millis).is_ok(),
                None => false,
            })
        }

        async fn find_stale(&self, updated_before: i64) -> Result<Vec<ImportJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.status == ImportStatus::Processing && j.updated_at < updated_before)
                .cloned()
                .collect())
        }

        async fn reset_stale(
            &self,
            id: &JobId,
            observed_updated_at: i64,
            now_millis: i64,
        ) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(match jobs.get_mut(id) {
                Some(job) if job.updated_at == observed_updated_at => job
                    .release("liveness threshold exceeded", now_millis)
                    .is_ok(),
                _ => false,
            })
        }

        async fn list_errors(
            &self,
            id: &JobId,
            page: u32,
            page_size: u32,
        ) -> Result<Page<RowOutcome>> {
            let mut errors: Vec<RowOutcome> = self
                .outcomes(id)
                .into_iter()
                .filter(|o| o.outcome.is_error())
                .collect();
            errors.sort_by_key(|o| o.row_number);
            let total = errors.len() as i64;
            let skip = (page.saturating_sub(1) as usize) * page_size as usize;
            Ok(Page {
                items: errors.into_iter().skip(skip).take(page_size as usize).collect(),
                page,
                page_size,
                total,
            })
        }

        async fn count_by_status(&self) -> Result<Vec<(ImportStatus, i64)>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(ImportStatus::ALL
                .into_iter()
                .map(|status| {
                    let count = jobs.values().filter(|j| j.status == status).count() as i64;
                    (status, count)
                })
                .collect())
        }
    }
}
