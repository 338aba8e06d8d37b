// Import Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Opaque reference to an uploaded payload, owned by the gateway
pub type SourceFileRef = String;

/// Import job status.
///
/// ```text
/// Pending -> Processing -> {Completed, CompletedWithErrors, Failed}
///    ^           |
///    +-----------+  (retry release / stale reset)
/// Pending -> Failed  (publish failure, cancellation)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ImportStatus {
    pub const ALL: [ImportStatus; 5] = [
        ImportStatus::Pending,
        ImportStatus::Processing,
        ImportStatus::Completed,
        ImportStatus::CompletedWithErrors,
        ImportStatus::Failed,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "PENDING",
            ImportStatus::Processing => "PROCESSING",
            ImportStatus::Completed => "COMPLETED",
            ImportStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
            ImportStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::CompletedWithErrors | ImportStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Pending)
                | (Processing, Completed)
                | (Processing, CompletedWithErrors)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        ImportStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Counters produced by one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Data rows examined in the batch (valid and invalid)
    pub processed: i64,
    /// Rows recorded as Invalid or Skipped
    pub errors: i64,
}

/// Import Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: JobId,
    pub status: ImportStatus,

    pub total_rows: i64,
    pub processed_rows: i64,
    pub error_rows: i64,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub finished_at: Option<i64>,

    pub source_file_ref: SourceFileRef,
    pub file_name: String,

    /// Attempt number of the delivery that last claimed the job
    pub attempt: i32,
    /// Last fatal error or cancellation reason
    pub last_error: Option<String>,
}

impl ImportJob {
    /// Create a new Pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `source_file_ref` - Where the gateway stored the upload
    /// * `file_name` - Name the file was uploaded under
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        source_file_ref: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: ImportStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            error_rows: 0,
            created_at,
            updated_at: created_at,
            finished_at: None,
            source_file_ref: source_file_ref.into(),
            file_name: file_name.into(),
            attempt: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, next: ImportStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_millis;
        if next.is_terminal() {
            self.finished_at = Some(now_millis);
        }
        Ok(())
    }

    /// Pending -> Processing
    pub fn claim(&mut self, attempt: i32, now_millis: i64) -> Result<()> {
        self.transition(ImportStatus::Processing, now_millis)?;
        self.attempt = attempt;
        Ok(())
    }

    /// Processing -> Pending, keeping committed progress as the resume offset
    pub fn release(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(ImportStatus::Pending, now_millis)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Apply one committed batch (only while Processing)
    pub fn record_batch(&mut self, progress: BatchProgress, now_millis: i64) -> Result<()> {
        if self.status != ImportStatus::Processing {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: ImportStatus::Processing.to_string(),
            });
        }
        self.processed_rows += progress.processed;
        self.error_rows += progress.errors;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Terminal status implied by the counters at end of file
    pub fn completion_status(&self) -> ImportStatus {
        if self.error_rows == 0 {
            ImportStatus::Completed
        } else {
            ImportStatus::CompletedWithErrors
        }
    }

    /// Processing -> Completed | CompletedWithErrors
    pub fn finish(&mut self, now_millis: i64) -> Result<ImportStatus> {
        let status = self.completion_status();
        self.transition(status, now_millis)?;
        self.total_rows = self.processed_rows;
        Ok(status)
    }

    /// Pending | Processing -> Failed
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(ImportStatus::Failed, now_millis)?;
        self.last_error = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ImportJob {
        ImportJob::new("job-1", 1000, "job-1.csv", "catalog.csv")
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, ImportStatus::Pending);
        assert_eq!(job.updated_at, 1000);
        assert!(job.finished_at.is_none());
        assert_eq!(job.attempt, 0);
    }

    #[test]
    fn test_full_lifecycle_with_errors() {
        let mut job = job();
        job.claim(0, 2000).unwrap();
        job.record_batch(BatchProgress { processed: 10, errors: 2 }, 3000)
            .unwrap();
        job.record_batch(BatchProgress { processed: 5, errors: 0 }, 4000)
            .unwrap();

        let status = job.finish(5000).unwrap();
        assert_eq!(status, ImportStatus::CompletedWithErrors);
        assert_eq!(job.total_rows, 15);
        assert_eq!(job.error_rows, 2);
        assert_eq!(job.finished_at, Some(5000));
    }

    #[test]
    fn test_terminal_state_is_written_once() {
        let mut job = job();
        job.claim(0, 2000).unwrap();
        job.finish(3000).unwrap();
        assert_eq!(job.status, ImportStatus::Completed);

        assert!(job.fail("late failure", 4000).is_err());
        assert!(job.finish(4000).is_err());
        assert_eq!(job.finished_at, Some(3000));
    }

    #[test]
    fn test_claim_requires_pending() {
        let mut job = job();
        job.claim(0, 2000).unwrap();
        assert!(job.claim(1, 2500).is_err());

        job.release("disk full", 3000).unwrap();
        assert_eq!(job.status, ImportStatus::Pending);
        assert_eq!(job.last_error.as_deref(), Some("disk full"));
        job.claim(1, 4000).unwrap();
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn test_progress_rejected_outside_processing() {
        let mut job = job();
        let result = job.record_batch(BatchProgress { processed: 1, errors: 0 }, 2000);
        assert!(result.is_err());
        assert_eq!(job.processed_rows, 0);
    }

    #[test]
    fn test_status_round_trips_through_storage_string() {
        for status in ImportStatus::ALL {
            assert_eq!(status.as_str().parse::<ImportStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ImportStatus>().is_err());
    }
}
