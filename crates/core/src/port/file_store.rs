// Source File Store Port
// Uploaded CSV payloads, written once by the gateway and read by workers.

use crate::domain::SourceFileRef;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io::Read;

/// Chunked upload body
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_ref: SourceFileRef,
    pub size_bytes: u64,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist a body under a job-scoped key. The file only becomes
    /// readable once the whole body has been written.
    async fn save(&self, key: &str, body: ByteStream<'_>) -> Result<StoredFile>;

    /// Blocking reader over a stored file. Call from a blocking context.
    fn open(&self, file_ref: &str) -> Result<Box<dyn Read + Send>>;

    /// Delete a stored file; false if it did not exist
    async fn delete(&self, file_ref: &str) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryFileStore {
        files: Mutex<HashMap<SourceFileRef, Vec<u8>>>,
    }

    impl InMemoryFileStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, file_ref: impl Into<String>, contents: impl Into<Vec<u8>>) {
            self.files
                .lock()
                .unwrap()
                .insert(file_ref.into(), contents.into());
        }

        pub fn contains(&self, file_ref: &str) -> bool {
            self.files.lock().unwrap().contains_key(file_ref)
        }

        pub fn len(&self) -> usize {
            self.files.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl FileStore for InMemoryFileStore {
        async fn save(&self, key: &str, body: ByteStream<'_>) -> Result<StoredFile> {
            let chunks: Vec<Bytes> = body.try_collect().await?;
            let contents: Vec<u8> = chunks.concat();
            let size_bytes = contents.len() as u64;
            let file_ref = format!("{}.csv", key);
            self.put(file_ref.clone(), contents);
            Ok(StoredFile {
                file_ref,
                size_bytes,
            })
        }

        fn open(&self, file_ref: &str) -> Result<Box<dyn Read + Send>> {
            let contents = self
                .files
                .lock()
                .unwrap()
                .get(file_ref)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("source file {}", file_ref)))?;
            Ok(Box::new(Cursor::new(contents)))
        }

        async fn delete(&self, file_ref: &str) -> Result<bool> {
            Ok(self.files.lock().unwrap().remove(file_ref).is_some())
        }
    }
}
