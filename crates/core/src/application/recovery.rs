// Crash recovery: startup requeue and the liveness sweep
use crate::application::retry::{with_transport_retry, RetryDecision, RetryPolicy};
use crate::application::worker::constants::{DEFAULT_LIVENESS_THRESHOLD_MS, DEFAULT_SWEEP_INTERVAL};
use crate::application::worker::ShutdownToken;
use crate::domain::{ImportJob, ImportMessage};
use crate::error::Result;
use crate::port::{JobStore, MessageTransport, TimeProvider, Topology};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Milliseconds without a heartbeat before a Processing job is stale
    pub liveness_threshold_ms: i64,
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            liveness_threshold_ms: DEFAULT_LIVENESS_THRESHOLD_MS,
            interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Finds Processing jobs whose worker stopped heartbeating and hands them
/// back to the queue
pub struct LivenessSweeper {
    job_store: Arc<dyn JobStore>,
    transport: Arc<dyn MessageTransport>,
    time_provider: Arc<dyn TimeProvider>,
    topology: Topology,
    policy: RetryPolicy,
    config: SweepConfig,
}

impl LivenessSweeper {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        transport: Arc<dyn MessageTransport>,
        time_provider: Arc<dyn TimeProvider>,
        topology: Topology,
        policy: RetryPolicy,
        config: SweepConfig,
    ) -> Self {
        Self {
            job_store,
            transport,
            time_provider,
            topology,
            policy,
            config,
        }
    }

    /// Return deliveries a crashed process left in flight.
    /// Run once at startup, before the worker pool starts.
    pub async fn recover_on_startup(&self) -> Result<u64> {
        let requeued = self.transport.requeue_unacked(&self.topology.queue).await?;
        if requeued > 0 {
            warn!(
                queue = %self.topology.queue,
                requeued = requeued,
                "Requeued deliveries left unacknowledged by a previous run"
            );
        }
        Ok(requeued)
    }

    /// One pass over stale Processing jobs
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.config.liveness_threshold_ms;
        let stale = self.job_store.find_stale(cutoff).await?;
        let mut report = SweepReport::default();

        for job in stale {
            warn!(
                job_id = %job.id,
                attempt = job.attempt,
                updated_at = job.updated_at,
                cutoff = cutoff,
                "Stale job detected"
            );
            match self.policy.decide(&job.id, job.attempt) {
                RetryDecision::DeadLetter => {
                    let reason = format!(
                        "no progress for {} ms after {} attempts",
                        self.config.liveness_threshold_ms, job.attempt
                    );
                    if self.job_store.fail(&job.id, &reason, now).await? {
                        report.failed += 1;
                    }
                }
                RetryDecision::Retry(_) => {
                    if self.requeue(&job, now).await? {
                        report.requeued += 1;
                    }
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                requeued = report.requeued,
                failed = report.failed,
                "Liveness sweep complete"
            );
        }
        Ok(report)
    }

    async fn requeue(&self, job: &ImportJob, now: i64) -> Result<bool> {
        // The worker may have heartbeated since we looked
        if !self
            .job_store
            .reset_stale(&job.id, job.updated_at, now)
            .await?
        {
            return Ok(false);
        }

        let message = ImportMessage {
            attempt: job.attempt + 1,
            ..ImportMessage::new(job.id.clone(), job.source_file_ref.clone())
        };
        let published = with_transport_retry("publish", || {
            self.transport.publish(
                &self.topology.exchange,
                &self.topology.routing_key,
                &message,
                Duration::ZERO,
            )
        })
        .await;

        if let Err(e) = published {
            // A Pending job without a message would never run again
            error!(job_id = %job.id, error = %e, "Recovery publish failed");
            let reason = format!("recovery publish failed: {}", e);
            self.job_store.fail(&job.id, &reason, now).await?;
            return Ok(false);
        }
        info!(job_id = %job.id, attempt = message.attempt, "Stale job requeued");
        Ok(true)
    }

    /// Sweep every `interval_secs` until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        info!(
            interval_secs = interval.as_secs(),
            liveness_threshold_ms = self.config.liveness_threshold_ms,
            "Liveness sweeper started"
        );
        while shutdown.sleep(interval).await {
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Liveness sweep failed");
            }
        }
        info!("Liveness sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryConfig;
    use crate::domain::ImportStatus;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::message_transport::mocks::InMemoryTransport;
    use crate::port::time_provider::mocks::ManualTimeProvider;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        transport: Arc<InMemoryTransport>,
        clock: Arc<ManualTimeProvider>,
        sweeper: LivenessSweeper,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let transport = Arc::new(InMemoryTransport::with_topology(&Topology::default()));
        let clock = Arc::new(ManualTimeProvider::new(0));
        let sweeper = LivenessSweeper::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            Topology::default(),
            RetryPolicy::new(RetryConfig {
                max_attempts: 2,
                ..Default::default()
            }),
            SweepConfig {
                liveness_threshold_ms: 1_000,
                interval_secs: 1,
            },
        );
        Harness {
            store,
            transport,
            clock,
            sweeper,
        }
    }

    fn processing(id: &str, attempt: i32, at: i64) -> ImportJob {
        let mut job = ImportJob::new(id, 0, format!("{id}.csv"), "c.csv");
        job.claim(attempt, at).unwrap();
        job
    }

    #[tokio::test]
    async fn test_stale_job_is_reset_and_republished() {
        let h = harness();
        h.store.put(processing("job-1", 0, 100));
        h.clock.set(5_000);

        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report, SweepReport { requeued: 1, failed: 0 });
        let job = h.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Pending);
        let published = h.transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].attempt, 1);
    }

    #[tokio::test]
    async fn test_fresh_job_is_left_alone() {
        let h = harness();
        h.store.put(processing("job-1", 0, 4_500));
        h.clock.set(5_000);

        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(h.transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_stale_job_past_max_attempts_fails() {
        let h = harness();
        h.store.put(processing("job-1", 2, 100));
        h.clock.set(5_000);

        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report, SweepReport { requeued: 0, failed: 1 });
        let job = h.store.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Failed);
        assert!(h.transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_startup_requeues_in_flight_deliveries() {
        let h = harness();
        let topology = Topology::default();
        h.transport
            .publish(
                &topology.exchange,
                &topology.routing_key,
                &ImportMessage::new("job-1", "job-1.csv"),
                Duration::ZERO,
            )
            .await
            .unwrap();
        h.transport.receive(&topology.queue).await.unwrap().unwrap();
        assert_eq!(h.transport.in_flight_count(), 1);

        assert_eq!(h.sweeper.recover_on_startup().await.unwrap(), 1);
        assert_eq!(h.transport.in_flight_count(), 0);
        let again = h.transport.receive(&topology.queue).await.unwrap().unwrap();
        assert!(again.is_redelivery());
    }
}
