// Row Outcome (append-only child of ImportJob)

use crate::domain::error::DomainError;
use crate::domain::import_job::JobId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Upserted,
    Skipped,
    Invalid,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Upserted => "UPSERTED",
            OutcomeKind::Skipped => "SKIPPED",
            OutcomeKind::Invalid => "INVALID",
        }
    }

    /// Counts towards `error_rows`
    pub fn is_error(&self) -> bool {
        !matches!(self, OutcomeKind::Upserted)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPSERTED" => Ok(OutcomeKind::Upserted),
            "SKIPPED" => Ok(OutcomeKind::Skipped),
            "INVALID" => Ok(OutcomeKind::Invalid),
            other => Err(DomainError::UnknownOutcome(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub job_id: JobId,
    /// 1-based data row number (the header is row 0)
    pub row_number: i64,
    pub sku: String,
    pub outcome: OutcomeKind,
    /// Reason when Invalid or Skipped
    pub detail: Option<String>,
}

impl RowOutcome {
    pub fn invalid(
        job_id: impl Into<String>,
        row_number: i64,
        sku: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            row_number,
            sku: sku.into(),
            outcome: OutcomeKind::Invalid,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(
        job_id: impl Into<String>,
        row_number: i64,
        sku: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            row_number,
            sku: sku.into(),
            outcome: OutcomeKind::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn upserted(job_id: impl Into<String>, row_number: i64, sku: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            row_number,
            sku: sku.into(),
            outcome: OutcomeKind::Upserted,
            detail: None,
        }
    }
}

/// One page of a paged listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        (self.page as i64) * (self.page_size as i64) < self.total
    }
}
