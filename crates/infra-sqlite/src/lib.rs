// Catalog Ingest Infrastructure - SQLite Adapters
// Implements: JobStore, CatalogRepository, MessageTransport, Maintenance

mod catalog_repository;
mod connection;
mod error;
mod job_store;
mod maintenance_impl;
mod message_transport;
mod migration;

pub use catalog_repository::SqliteCatalogRepository;
pub use connection::{create_pool, DEFAULT_MAX_CONNECTIONS};
pub use error::map_sqlx_error;
pub use job_store::SqliteJobStore;
pub use maintenance_impl::SqliteMaintenance;
pub use message_transport::SqliteMessageTransport;
pub use migration::run_migrations;
pub use sqlx::SqlitePool;

// sqlx::Error cannot convert into AppError here (orphan rules); every
// adapter maps it explicitly with the helpers in `error`.

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    /// Migrated pool over a database file in its own temp directory.
    /// `sqlite::memory:` would give every pooled connection its own database.
    /// The directory is removed when this is dropped.
    pub struct TestDb {
        pub pool: SqlitePool,
        _dir: TempDir,
    }

    pub async fn test_db() -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let pool = crate::create_pool(&url, 4).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        TestDb { pool, _dir: dir }
    }
}
