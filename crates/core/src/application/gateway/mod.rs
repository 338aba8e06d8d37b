// Ingestion Gateway - upload intake and job registration

pub mod submit;

pub use submit::Upload;

use crate::domain::{DeliveryId, JobId, SourceFileRef};
use crate::error::{AppError, Result};
use crate::port::{FileStore, IdProvider, JobStore, MessageTransport, TimeProvider, Topology};
use std::sync::Arc;
use submit::SubmitDeps;
use tracing::info;

pub struct IngestionGateway {
    job_store: Arc<dyn JobStore>,
    file_store: Arc<dyn FileStore>,
    transport: Arc<dyn MessageTransport>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    topology: Topology,
}

impl IngestionGateway {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        file_store: Arc<dyn FileStore>,
        transport: Arc<dyn MessageTransport>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        topology: Topology,
    ) -> Self {
        Self {
            job_store,
            file_store,
            transport,
            id_provider,
            time_provider,
            topology,
        }
    }

    fn deps(&self) -> SubmitDeps<'_> {
        SubmitDeps {
            job_store: self.job_store.as_ref(),
            file_store: self.file_store.as_ref(),
            transport: self.transport.as_ref(),
            id_provider: self.id_provider.as_ref(),
            time_provider: self.time_provider.as_ref(),
            topology: &self.topology,
        }
    }

    /// Accept an upload and return the new job id
    pub async fn submit(&self, upload: Upload<'_>) -> Result<JobId> {
        submit::execute(&self.deps(), upload).await
    }

    /// Register a fresh job over an already stored source file
    pub async fn resubmit(&self, source_file_ref: SourceFileRef, file_name: String) -> Result<JobId> {
        let job_id = self.id_provider.generate_id();
        submit::register(&self.deps(), job_id, source_file_ref, file_name).await
    }

    /// Resubmit a dead-lettered job's source file as a new job, then drop
    /// the dead letter
    pub async fn replay_dead_letter(&self, id: DeliveryId) -> Result<JobId> {
        let dead_letter = self
            .transport
            .find_dead_letter(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dead letter {} not found", id)))?;

        let original = &dead_letter.message;
        let file_name = self
            .job_store
            .find_by_id(&original.job_id)
            .await?
            .map(|job| job.file_name)
            .unwrap_or_else(|| original.source_file_ref.clone());

        let job_id = self
            .resubmit(original.source_file_ref.clone(), file_name)
            .await?;
        self.transport.remove_dead_letter(id).await?;

        info!(
            dead_letter_id = id,
            original_job_id = %original.job_id,
            job_id = %job_id,
            "Dead letter replayed"
        );
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImportStatus;
    use crate::port::file_store::mocks::InMemoryFileStore;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::message_transport::mocks::InMemoryTransport;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    struct Harness {
        store: Arc<InMemoryJobStore>,
        files: Arc<InMemoryFileStore>,
        transport: Arc<InMemoryTransport>,
        gateway: IngestionGateway,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let files = Arc::new(InMemoryFileStore::new());
        let transport = Arc::new(InMemoryTransport::with_topology(&Topology::default()));
        let gateway = IngestionGateway::new(
            store.clone(),
            files.clone(),
            transport.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(ManualTimeProvider::new(1_000)),
            Topology::default(),
        );
        Harness {
            store,
            files,
            transport,
            gateway,
        }
    }

    fn upload(contents: &'static str, content_type: Option<&str>) -> Upload<'static> {
        Upload {
            file_name: "catalog.csv".to_string(),
            content_type: content_type.map(str::to_string),
            body: stream::iter(vec![Ok(Bytes::from_static(contents.as_bytes()))]).boxed(),
        }
    }

    const VALID: &str = "sku,name,price,category,stock,imageUrl\nA,Apple,1.00,fruit,3,\n";

    #[tokio::test]
    async fn test_submit_stores_registers_and_publishes() {
        let h = harness();
        let job_id = h.gateway.submit(upload(VALID, Some("text/csv"))).await.unwrap();

        assert_eq!(job_id, "job-1");
        assert!(h.files.contains("job-1.csv"));
        let job = h.store.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Pending);
        assert_eq!(job.source_file_ref, "job-1.csv");
        assert_eq!(job.file_name, "catalog.csv");

        let published = h.transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].job_id, "job-1");
        assert_eq!(published[0].attempt, 0);
    }

    #[tokio::test]
    async fn test_schema_mismatch_creates_nothing() {
        let h = harness();
        let err = h
            .gateway
            .submit(upload("sku,name,price\nA,B,1\n", Some("text/csv")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SchemaMismatch(_)));
        assert!(h.files.is_empty());
        assert!(h.transport.published().is_empty());
        assert!(h.store.find_by_id(&"job-1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_or_non_csv_is_invalid_upload() {
        let h = harness();
        let err = h.gateway.submit(upload("", Some("text/csv"))).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidUpload(_)));

        let err = h
            .gateway
            .submit(upload(VALID, Some("image/png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidUpload(_)));
        assert!(h.files.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_marks_job_failed() {
        let h = harness();
        h.transport.fail_next_publishes(10);

        let err = h.gateway.submit(upload(VALID, None)).await.unwrap_err();

        assert!(matches!(err, AppError::Transport(_)));
        let job = h.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Failed);
        assert!(job.last_error.unwrap().starts_with("publish failed"));
    }

    #[tokio::test]
    async fn test_replay_dead_letter_creates_new_job() {
        let h = harness();
        let topology = Topology::default();
        let first = h.gateway.submit(upload(VALID, None)).await.unwrap();
        let delivery = h.transport.receive(&topology.queue).await.unwrap().unwrap();
        h.transport.nack(&delivery, false).await.unwrap();
        let dead = h
            .transport
            .list_dead_letters(&topology.dead_letter_queue, 10)
            .await
            .unwrap();
        assert_eq!(dead.len(), 1);

        let replayed = h.gateway.replay_dead_letter(dead[0].id).await.unwrap();

        assert_ne!(replayed, first);
        let job = h.store.find_by_id(&replayed).await.unwrap().unwrap();
        assert_eq!(job.source_file_ref, "job-1.csv");
        assert_eq!(job.file_name, "catalog.csv");
        assert_eq!(h.transport.dead_letter_count(), 0);
        assert_eq!(h.files.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_unknown_dead_letter_is_not_found() {
        let h = harness();
        let err = h.gateway.replay_dead_letter(42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
