// Retry / Backoff Controller
use crate::application::worker::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_RETRY_MAX_DELAY_MS, TRANSPORT_RETRY_ATTEMPTS, TRANSPORT_RETRY_BASE_DELAY,
};
use crate::domain::{Delivery, JobId};
use crate::error::{AppError, Result};
use crate::port::{JobStore, MessageTransport, TimeProvider, Topology};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Republish after the backoff delay
    Retry(Duration),
    /// Attempts exhausted; park the message on the dead-letter queue
    DeadLetter,
}

/// What the controller did with a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHandling {
    /// Next attempt published with a delay, original acked
    Retried { next_attempt: i32, delay: Duration },
    /// Original nacked without requeue, job failed
    DeadLettered,
    /// The job had already left Processing (cancelled); original acked
    Dropped,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: i32,
    pub base_delay_ms: i64,
    pub backoff_factor: f64,
    pub max_delay_ms: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

/// Exponential backoff with a cap and per-job jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> i32 {
        self.config.max_attempts
    }

    /// Decide what happens after `attempt` failed.
    ///
    /// `attempt >= max_attempts` dead-letters, so a delivery that always
    /// fails is handled `max_attempts + 1` times in total.
    pub fn decide(&self, job_id: &str, attempt: i32) -> RetryDecision {
        if attempt >= self.config.max_attempts {
            warn!(
                job_id = %job_id,
                attempt = attempt,
                max_attempts = self.config.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::DeadLetter;
        }
        RetryDecision::Retry(self.backoff_delay(job_id, attempt))
    }

    /// delay = min(base * factor^attempt, max) * (1.0 ± 0.1)
    ///
    /// The jitter is seeded by the job id so a given job always backs off
    /// the same way while different jobs spread out.
    pub fn backoff_delay(&self, job_id: &str, attempt: i32) -> Duration {
        let raw = self.config.base_delay_ms as f64 * self.config.backoff_factor.powi(attempt);
        let capped = raw.min(self.config.max_delay_ms as f64);

        let jitter_seed = job_id.chars().map(|c| c as u32).fold(0u32, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (capped * jitter_factor).max(0.0) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Retry a transport call locally before surfacing a TransportError.
/// Only `AppError::Transport` is retried; anything else returns at once.
pub async fn with_transport_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = TRANSPORT_RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(AppError::Transport(message)) if attempt < TRANSPORT_RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transport call failed, retrying locally"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Applies the retry decision to a delivery whose processing failed
pub struct RetryController {
    job_store: Arc<dyn JobStore>,
    transport: Arc<dyn MessageTransport>,
    topology: Topology,
    policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl RetryController {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        transport: Arc<dyn MessageTransport>,
        topology: Topology,
        policy: RetryPolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_store,
            transport,
            topology,
            policy,
            time_provider,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Handle a fatal processing error for a claimed job.
    ///
    /// Retry: job back to Pending, next attempt republished with the delay,
    /// then the original acked. DeadLetter: job Failed, original nacked
    /// without requeue.
    pub async fn on_failure(&self, delivery: &Delivery, cause: &AppError) -> Result<FailureHandling> {
        let message = &delivery.message;
        let job_id: &JobId = &message.job_id;
        let reason = cause.to_string();
        let now = self.time_provider.now_millis();

        match self.policy.decide(job_id, message.attempt) {
            RetryDecision::Retry(delay) => {
                if !self
                    .job_store
                    .release(job_id, message.attempt, &reason, now)
                    .await?
                {
                    info!(
                        job_id = %job_id,
                        "Job no longer owned by this attempt, dropping delivery"
                    );
                    self.transport.ack(delivery).await?;
                    return Ok(FailureHandling::Dropped);
                }

                let next = message.next_attempt();
                with_transport_retry("publish", || {
                    self.transport.publish(
                        &self.topology.exchange,
                        &self.topology.routing_key,
                        &next,
                        delay,
                    )
                })
                .await?;
                self.transport.ack(delivery).await?;

                info!(
                    job_id = %job_id,
                    attempt = next.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Retry scheduled"
                );
                Ok(FailureHandling::Retried {
                    next_attempt: next.attempt,
                    delay,
                })
            }
            RetryDecision::DeadLetter => {
                let failed = self.job_store.fail(job_id, &reason, now).await?;
                self.transport.nack(delivery, false).await?;
                error!(
                    job_id = %job_id,
                    attempt = message.attempt,
                    job_failed = failed,
                    error = %reason,
                    "Delivery dead-lettered after exhausting retries"
                );
                Ok(FailureHandling::DeadLettered)
            }
        }
    }
}
