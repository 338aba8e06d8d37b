//! Shared wiring: SQLite stores and broker over a temp-file database, local
//! file storage in a temp directory, and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tempfile::TempDir;

use catalog_ingest_core::application::{
    DeliveryOutcome, ImportQueryService, ImportWorker, IngestionGateway, RetryConfig,
    RetryController, RetryPolicy, Upload, WorkerConfig,
};
use catalog_ingest_core::domain::{ImportJob, JobId, Product};
use catalog_ingest_core::error::{AppError, Result};
use catalog_ingest_core::port::id_provider::mocks::SequentialIdProvider;
use catalog_ingest_core::port::time_provider::mocks::ManualTimeProvider;
use catalog_ingest_core::port::{
    CatalogRepository, JobStore, MessageTransport, TimeProvider, Topology, UpsertReport,
};
use catalog_ingest_infra_fs::LocalFileStore;
use catalog_ingest_infra_sqlite::{
    create_pool, run_migrations, SqliteCatalogRepository, SqliteJobStore, SqliteMessageTransport,
    SqlitePool,
};

pub const HEADER: &str = "sku,name,price,category,stock,imageUrl\n";

/// Retry settings with no backoff so retries are immediately visible
pub fn instant_retry(max_attempts: i32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 0,
        backoff_factor: 2.0,
        max_delay_ms: 0,
    }
}

pub struct Pipeline {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub clock: Arc<ManualTimeProvider>,
    pub topology: Topology,
    pub jobs: Arc<SqliteJobStore>,
    pub catalog: Arc<SqliteCatalogRepository>,
    pub transport: Arc<SqliteMessageTransport>,
    pub files: Arc<LocalFileStore>,
    pub gateway: IngestionGateway,
    pub queries: ImportQueryService,
    pub retry: Arc<RetryController>,
}

impl Pipeline {
    pub async fn new(retry: RetryConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let pool = create_pool(&url, 4).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let time: Arc<dyn TimeProvider> = clock.clone();
        let topology = Topology::default();

        let jobs = Arc::new(SqliteJobStore::new(pool.clone()));
        let catalog = Arc::new(SqliteCatalogRepository::new(pool.clone(), time.clone()));
        let transport = Arc::new(SqliteMessageTransport::new(pool.clone(), time.clone()));
        let files = Arc::new(LocalFileStore::new(dir.path().join("uploads")).await.unwrap());
        transport.declare_topology(&topology).await.unwrap();

        let gateway = IngestionGateway::new(
            jobs.clone(),
            files.clone(),
            transport.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            time.clone(),
            topology.clone(),
        );
        let queries =
            ImportQueryService::new(jobs.clone(), transport.clone(), time.clone(), topology.clone());
        let retry = Arc::new(RetryController::new(
            jobs.clone(),
            transport.clone(),
            topology.clone(),
            RetryPolicy::new(retry),
            time,
        ));

        Self {
            _dir: dir,
            pool,
            clock,
            topology,
            jobs,
            catalog,
            transport,
            files,
            gateway,
            queries,
            retry,
        }
    }

    /// Worker over the SQLite catalog
    pub fn worker(&self, batch_size: usize) -> ImportWorker {
        self.worker_with(self.catalog.clone(), batch_size)
    }

    /// Worker over any catalog implementation
    pub fn worker_with(&self, catalog: Arc<dyn CatalogRepository>, batch_size: usize) -> ImportWorker {
        ImportWorker::new(
            self.jobs.clone(),
            catalog,
            self.files.clone(),
            self.transport.clone(),
            self.retry.clone(),
            self.clock.clone(),
            WorkerConfig {
                pool_size: 1,
                batch_size,
                record_upserted_rows: false,
            },
        )
    }

    /// Upload a CSV through the gateway, delivered in small chunks
    pub async fn upload(&self, file_name: &str, contents: &str) -> JobId {
        let chunks: Vec<std::io::Result<Bytes>> = contents
            .as_bytes()
            .chunks(64)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        self.gateway
            .submit(Upload {
                file_name: file_name.to_string(),
                content_type: Some("text/csv".to_string()),
                body: stream::iter(chunks).boxed(),
            })
            .await
            .unwrap()
    }

    pub async fn job(&self, id: &str) -> ImportJob {
        self.jobs.find_by_id(&id.to_string()).await.unwrap().unwrap()
    }

    /// Handle deliveries until the queue has nothing visible
    pub async fn drain(&self, worker: &ImportWorker) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = worker.process_next(&self.topology.queue).await.unwrap() {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Catalog wrapper that records every batch it is handed
pub struct RecordingCatalog {
    pub inner: Arc<dyn CatalogRepository>,
    batches: Mutex<Vec<usize>>,
}

impl RecordingCatalog {
    pub fn new(inner: Arc<dyn CatalogRepository>) -> Self {
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogRepository for RecordingCatalog {
    async fn upsert_batch(&self, products: &[Product]) -> Result<UpsertReport> {
        self.batches.lock().unwrap().push(products.len());
        self.inner.upsert_batch(products).await
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        self.inner.find_by_sku(sku).await
    }

    async fn count(&self) -> Result<i64> {
        self.inner.count().await
    }
}

/// Catalog whose commits always fail
pub struct BrokenCatalog;

#[async_trait]
impl CatalogRepository for BrokenCatalog {
    async fn upsert_batch(&self, _products: &[Product]) -> Result<UpsertReport> {
        Err(AppError::Persistence("database is locked".to_string()))
    }

    async fn find_by_sku(&self, _sku: &str) -> Result<Option<Product>> {
        Ok(None)
    }

    async fn count(&self) -> Result<i64> {
        Ok(0)
    }
}

/// `rows` valid data rows with SKUs `SKU-00000`, `SKU-00001`, ...
pub fn synthetic_csv(rows: usize) -> String {
    let mut csv = String::with_capacity(HEADER.len() + rows * 48);
    csv.push_str(HEADER);
    for i in 0..rows {
        csv.push_str(&format!(
            "SKU-{:05},Item {},{}.{:02},bulk,{},\n",
            i,
            i,
            i % 100,
            i % 100,
            i % 7
        ));
    }
    csv
}
