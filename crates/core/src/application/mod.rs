// Application Layer - Use Cases and Business Logic

pub mod gateway;
pub mod maintenance;
pub mod recovery;
pub mod retry;
pub mod status;
pub mod worker;

// Re-exports
pub use gateway::{IngestionGateway, Upload};
pub use maintenance::MaintenanceScheduler;
pub use recovery::{LivenessSweeper, SweepConfig, SweepReport};
pub use retry::{RetryConfig, RetryController, RetryDecision, RetryPolicy};
pub use status::{ImportQueryService, ImportStats, StatusCount};
pub use worker::{
    shutdown_channel, DeliveryOutcome, ImportWorker, ShutdownSender, ShutdownToken, WorkerConfig,
    WorkerPool,
};
