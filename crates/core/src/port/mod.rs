// Port Layer - Interfaces for external dependencies

pub mod catalog_repository;
pub mod file_store;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod maintenance;
pub mod message_transport;
pub mod time_provider;

// Re-exports
pub use catalog_repository::{CatalogRepository, ItemFailure, UpsertReport};
pub use file_store::{ByteStream, FileStore, StoredFile};
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use maintenance::{
    GcReport, Maintenance, MaintenanceConfig, MaintenanceReport, MaintenanceStats,
};
pub use message_transport::{MessageTransport, Topology};
pub use time_provider::TimeProvider;
