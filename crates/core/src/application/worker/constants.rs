// Pipeline constants (no magic values)
use std::time::Duration;

/// Sleep duration when the queue has no visible message (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a receive/ack error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default number of concurrent worker slots
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default data rows per upsert batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Chunks buffered between the blocking CSV reader and the async worker
pub const ROW_CHANNEL_CAPACITY: usize = 1;

/// Default delivery attempts before dead-lettering
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default exponential backoff factor
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound of a single backoff delay (5 minutes)
pub const DEFAULT_RETRY_MAX_DELAY_MS: i64 = 5 * 60 * 1000;

/// A Processing job silent for this long is considered stale (5 minutes)
pub const DEFAULT_LIVENESS_THRESHOLD_MS: i64 = 5 * 60 * 1000;

/// How often the liveness sweep runs (60s)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Local retries of a single transport call before giving up
pub const TRANSPORT_RETRY_ATTEMPTS: u32 = 3;

/// First local transport retry delay, doubled on each retry (200ms)
pub const TRANSPORT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Largest header row the gateway inspects (64 KiB)
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Default page size of the row-error listing
pub const DEFAULT_ERRORS_PAGE_SIZE: u32 = 50;

/// Largest accepted page size of the row-error listing
pub const MAX_ERRORS_PAGE_SIZE: u32 = 500;

/// Default number of dead letters listed at once
pub const DEFAULT_DEAD_LETTER_LIMIT: u32 = 100;
