// Import Message (wire format) and Transport Delivery

use crate::domain::import_job::{JobId, SourceFileRef};
use serde::{Deserialize, Serialize};

/// Payload published once per job (and once per retry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMessage {
    pub job_id: JobId,
    pub source_file_ref: SourceFileRef,
    /// Redelivery counter, starts at 0
    #[serde(default)]
    pub attempt: i32,
}

impl ImportMessage {
    pub fn new(job_id: impl Into<String>, source_file_ref: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            source_file_ref: source_file_ref.into(),
            attempt: 0,
        }
    }

    /// Copy of this message for the next attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Transport-assigned delivery identifier
pub type DeliveryId = i64;

/// A message handed to a consumer; must be acked or nacked exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_id: DeliveryId,
    pub queue: String,
    pub message: ImportMessage,
    /// Number of times this message has been handed out, including this one
    pub delivery_count: i32,
}

impl Delivery {
    /// Delivered before and not acknowledged (crash or requeue)
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// A message parked on a dead-letter queue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: DeliveryId,
    pub queue: String,
    pub origin_queue: String,
    pub message: ImportMessage,
    pub dead_lettered_at: i64,
}
