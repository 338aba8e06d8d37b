// Import Worker - delivery handling and consume loop

pub mod constants;
mod row_stream;
mod shutdown;

use constants::*;
pub use row_stream::{read_chunks, ParsedRow, RowChunk};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::{FailureHandling, RetryController};
use crate::domain::{BatchProgress, Delivery, ImportJob, ImportStatus, JobId, Product, RowOutcome};
use crate::error::{AppError, Result};
use crate::port::{CatalogRepository, FileStore, JobStore, MessageTransport, TimeProvider};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent deliveries (one unacknowledged message per slot)
    pub pool_size: usize,
    /// Data rows per upsert transaction
    pub batch_size: usize,
    /// Also store an Upserted outcome per applied row
    pub record_upserted_rows: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            record_upserted_rows: false,
        }
    }
}

/// What happened to one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Job reached Completed / CompletedWithErrors
    Completed(ImportStatus),
    /// Claim refused (duplicate, terminal, or unknown job)
    Duplicate,
    /// Job left Processing between batches
    Cancelled,
    /// Fatal error routed through the retry controller
    Failed(FailureHandling),
    /// Delivery returned to the queue untouched (job store unreachable)
    Requeued,
}

/// How a processing run ended (before finishing the job)
enum RunEnd {
    EndOfFile,
    Cancelled,
}

/// Handles import deliveries. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct ImportWorker {
    job_store: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogRepository>,
    file_store: Arc<dyn FileStore>,
    transport: Arc<dyn MessageTransport>,
    retry: Arc<RetryController>,
    time_provider: Arc<dyn TimeProvider>,
    config: WorkerConfig,
}

impl ImportWorker {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogRepository>,
        file_store: Arc<dyn FileStore>,
        transport: Arc<dyn MessageTransport>,
        retry: Arc<RetryController>,
        time_provider: Arc<dyn TimeProvider>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            job_store,
            catalog,
            file_store,
            transport,
            retry,
            time_provider,
            config,
        }
    }

    /// Take one message off `queue` and handle it.
    /// Returns None when nothing was visible.
    pub async fn process_next(&self, queue: &str) -> Result<Option<DeliveryOutcome>> {
        match self.transport.receive(queue).await? {
            Some(delivery) => Ok(Some(self.handle(&delivery).await?)),
            None => Ok(None),
        }
    }

    /// Handle a single delivery end to end: claim, stream, finish, ack.
    ///
    /// Only transport failures while acking/nacking surface as `Err`; every
    /// other failure is settled on the delivery itself.
    pub async fn handle(&self, delivery: &Delivery) -> Result<DeliveryOutcome> {
        let message = &delivery.message;
        let job_id = &message.job_id;
        let now = self.time_provider.now_millis();

        let claimed = match self.job_store.try_claim(job_id, message.attempt, now).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    delivery_id = delivery.delivery_id,
                    error = %e,
                    "Claim failed, requeueing delivery"
                );
                self.transport.nack(delivery, true).await?;
                return Ok(DeliveryOutcome::Requeued);
            }
        };
        if !claimed {
            info!(
                job_id = %job_id,
                delivery_id = delivery.delivery_id,
                redelivery = delivery.is_redelivery(),
                "Claim refused, acknowledging duplicate delivery"
            );
            self.transport.ack(delivery).await?;
            return Ok(DeliveryOutcome::Duplicate);
        }

        info!(job_id = %job_id, attempt = message.attempt, "Import job claimed");

        // Panics inside processing surface as a JoinError instead of
        // taking the worker slot down.
        let this = self.clone();
        let id = job_id.clone();
        let attempt = message.attempt;
        let run = tokio::spawn(async move { this.process_job(&id, attempt).await }).await;

        let result = match run {
            Ok(Ok(RunEnd::EndOfFile)) => self.finish_job(job_id, attempt).await,
            Ok(Ok(RunEnd::Cancelled)) => Ok(None),
            Ok(Err(e)) => Err(e),
            Err(join_err) => {
                error!(job_id = %job_id, error = %join_err, "Import task panicked");
                Err(AppError::Internal(format!("import task aborted: {}", join_err)))
            }
        };

        match result {
            Ok(Some(status)) => {
                self.transport.ack(delivery).await?;
                Ok(DeliveryOutcome::Completed(status))
            }
            Ok(None) => {
                info!(job_id = %job_id, "Import job no longer Processing, stopping");
                self.transport.ack(delivery).await?;
                Ok(DeliveryOutcome::Cancelled)
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    attempt = message.attempt,
                    error = %e,
                    "Import attempt failed"
                );
                match self.retry.on_failure(delivery, &e).await {
                    Ok(handling) => Ok(DeliveryOutcome::Failed(handling)),
                    Err(retry_err) => {
                        // Leave the job Processing; the delivery returns and
                        // the liveness sweep covers a lost requeue.
                        error!(
                            job_id = %job_id,
                            error = %retry_err,
                            "Retry handling failed, requeueing delivery"
                        );
                        self.transport.nack(delivery, true).await?;
                        Ok(DeliveryOutcome::Requeued)
                    }
                }
            }
        }
    }

    async fn finish_job(&self, job_id: &JobId, attempt: i32) -> Result<Option<ImportStatus>> {
        let now = self.time_provider.now_millis();
        let status = self.job_store.finish(job_id, attempt, now).await?;
        if let Some(status) = status {
            info!(job_id = %job_id, status = %status, "Import job finished");
        }
        Ok(status)
    }

    /// Stream the job's file through validation and batched upserts.
    /// Stops as soon as `attempt` no longer owns the job.
    async fn process_job(&self, job_id: &JobId, attempt: i32) -> Result<RunEnd> {
        let job = self
            .job_store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        if !owned_by(&job, attempt) {
            return Ok(RunEnd::Cancelled);
        }

        if job.processed_rows > 0 {
            info!(
                job_id = %job.id,
                resume_after = job.processed_rows,
                "Resuming import after committed rows"
            );
        }

        let (tx, mut rx) = mpsc::channel::<RowChunk>(ROW_CHANNEL_CAPACITY);
        let file_store = Arc::clone(&self.file_store);
        let file_ref = job.source_file_ref.clone();
        let batch_size = self.config.batch_size;
        let skip_rows = job.processed_rows;
        let reader = tokio::task::spawn_blocking(move || {
            let source = file_store.open(&file_ref)?;
            read_chunks(source, batch_size, skip_rows, tx)
        });

        while let Some(chunk) = rx.recv().await {
            if !self.still_owned(&job.id, attempt).await? {
                return Ok(RunEnd::Cancelled);
            }
            if !self.commit_chunk(&job, attempt, chunk).await? {
                return Ok(RunEnd::Cancelled);
            }
        }

        reader
            .await
            .map_err(|e| AppError::Internal(format!("CSV reader aborted: {}", e)))??;
        Ok(RunEnd::EndOfFile)
    }

    async fn still_owned(&self, job_id: &JobId, attempt: i32) -> Result<bool> {
        Ok(self
            .job_store
            .find_by_id(job_id)
            .await?
            .is_some_and(|job| owned_by(&job, attempt)))
    }

    /// Upsert a chunk's valid rows, then record progress and outcomes.
    /// Returns false when the job store refused the progress (job left
    /// Processing or was taken over by a later attempt).
    async fn commit_chunk(&self, job: &ImportJob, attempt: i32, chunk: RowChunk) -> Result<bool> {
        let row_count = chunk.len() as i64;
        let mut outcomes: Vec<RowOutcome> = Vec::new();
        let mut valid: Vec<(i64, Product)> = Vec::with_capacity(chunk.len());

        for row in chunk {
            match row.parsed {
                Ok(product) => valid.push((row.row_number, product)),
                Err(detail) => outcomes.push(RowOutcome::invalid(
                    job.id.as_str(),
                    row.row_number,
                    row.sku,
                    detail,
                )),
            }
        }

        // Within one batch the last row for a SKU wins
        let mut last_row_for: HashMap<&str, i64> = HashMap::new();
        for (row_number, product) in &valid {
            last_row_for.insert(product.sku.as_str(), *row_number);
        }
        let mut rows: Vec<i64> = Vec::with_capacity(valid.len());
        let mut products: Vec<Product> = Vec::with_capacity(valid.len());
        let mut superseded: Vec<RowOutcome> = Vec::new();
        for (row_number, product) in &valid {
            let winner = last_row_for[product.sku.as_str()];
            if winner == *row_number {
                rows.push(*row_number);
                products.push(product.clone());
            } else {
                superseded.push(RowOutcome::skipped(
                    job.id.as_str(),
                    *row_number,
                    product.sku.as_str(),
                    format!("superseded by row {} with the same sku", winner),
                ));
            }
        }
        outcomes.extend(superseded);

        let report = if products.is_empty() {
            Default::default()
        } else {
            self.catalog.upsert_batch(&products).await?
        };

        let mut refused = vec![false; products.len()];
        for failure in &report.failures {
            if let Some(row_number) = rows.get(failure.index) {
                refused[failure.index] = true;
                outcomes.push(RowOutcome::skipped(
                    job.id.as_str(),
                    *row_number,
                    failure.sku.as_str(),
                    failure.reason.as_str(),
                ));
            }
        }
        if self.config.record_upserted_rows {
            for (index, product) in products.iter().enumerate() {
                if !refused[index] {
                    outcomes.push(RowOutcome::upserted(
                        job.id.as_str(),
                        rows[index],
                        product.sku.as_str(),
                    ));
                }
            }
        }
        outcomes.sort_by_key(|o| o.row_number);

        let progress = BatchProgress {
            processed: row_count,
            errors: outcomes.iter().filter(|o| o.outcome.is_error()).count() as i64,
        };
        let now = self.time_provider.now_millis();
        let recorded = self
            .job_store
            .record_batch(&job.id, attempt, progress, &outcomes, now)
            .await?;

        debug!(
            job_id = %job.id,
            rows = row_count,
            applied = report.applied,
            errors = progress.errors,
            recorded = recorded,
            "Batch committed"
        );
        Ok(recorded)
    }

    /// Consume `queue` until shutdown
    pub async fn run(&self, queue: &str, slot: usize, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %queue, slot = slot, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next(queue).await {
                Ok(Some(outcome)) => {
                    debug!(slot = slot, outcome = ?outcome, "Delivery handled");
                }
                Ok(None) => {
                    if !shutdown.sleep(IDLE_SLEEP_DURATION).await {
                        info!(slot = slot, "Worker interrupted during idle");
                        break;
                    }
                }
                Err(e) => {
                    error!(slot = slot, error = %e, "Worker error");
                    if !shutdown.sleep(ERROR_RECOVERY_SLEEP_DURATION).await {
                        info!(slot = slot, "Worker interrupted during error recovery");
                        break;
                    }
                }
            }
        }
        info!(queue = %queue, slot = slot, "Worker stopped");
        Ok(())
    }
}

fn owned_by(job: &ImportJob, attempt: i32) -> bool {
    job.status == ImportStatus::Processing && job.attempt == attempt
}

/// N worker slots over one queue
pub struct WorkerPool {
    worker: ImportWorker,
    queue: String,
    size: usize,
}

impl WorkerPool {
    pub fn new(worker: ImportWorker, queue: impl Into<String>, size: usize) -> Self {
        Self {
            worker,
            queue: queue.into(),
            size: size.max(1),
        }
    }

    /// Run every slot until shutdown; a delivery in progress completes first
    pub async fn run(self, shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %self.queue, size = self.size, "Worker pool starting");
        let mut slots = JoinSet::new();
        for slot in 0..self.size {
            let worker = self.worker.clone();
            let queue = self.queue.clone();
            let token = shutdown.clone();
            slots.spawn(async move { worker.run(&queue, slot, token).await });
        }
        while let Some(joined) = slots.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Worker slot exited with error"),
                Err(e) => error!(error = %e, "Worker slot aborted"),
            }
        }
        info!(queue = %self.queue, "Worker pool stopped");
        Ok(())
    }
}
