// Domain Layer - Pure business logic and entities

pub mod csv_schema;
pub mod error;
pub mod import_job;
pub mod message;
pub mod product;
pub mod row_outcome;

// Re-exports
pub use csv_schema::{CsvSchema, SchemaError, REQUIRED_COLUMNS};
pub use error::DomainError;
pub use import_job::{BatchProgress, ImportJob, ImportStatus, JobId, SourceFileRef};
pub use message::{DeadLetter, Delivery, DeliveryId, ImportMessage};
pub use product::{InvalidRow, Price, Product, RowValidationError, Sku};
pub use row_outcome::{OutcomeKind, Page, RowOutcome};
