// Catalog Ingest Infrastructure - Filesystem Adapters
// Implements: FileStore

mod local_file_store;

pub use local_file_store::LocalFileStore;
