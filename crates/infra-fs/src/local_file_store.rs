// Local directory FileStore
//
// Uploads are streamed to `<key>.csv.part` and renamed into place once the
// body is complete, so a reader never sees a partial file.

use async_trait::async_trait;
use catalog_ingest_core::error::{AppError, Result};
use catalog_ingest_core::port::{ByteStream, FileStore, StoredFile};
use futures::StreamExt;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Open (and create if needed) the storage directory
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// File refs are bare file names inside the root
    fn resolve(&self, file_ref: &str) -> Result<PathBuf> {
        let valid = !file_ref.is_empty()
            && !file_ref.contains(['/', '\\'])
            && file_ref != "."
            && file_ref != "..";
        if !valid {
            return Err(AppError::InvalidState(format!(
                "invalid source file reference: {:?}",
                file_ref
            )));
        }
        Ok(self.root.join(file_ref))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, key: &str, mut body: ByteStream<'_>) -> Result<StoredFile> {
        let file_ref = format!("{}.csv", key);
        let final_path = self.resolve(&file_ref)?;
        let part_path = self.resolve(&format!("{}.part", file_ref))?;

        let mut file = tokio::fs::File::create(&part_path).await?;
        let mut size_bytes = 0u64;

        let written: std::io::Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                size_bytes += chunk.len() as u64;
            }
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                warn!(path = %part_path.display(), error = %cleanup, "Could not remove partial upload");
            }
            return Err(e.into());
        }
        drop(file);

        tokio::fs::rename(&part_path, &final_path).await?;
        debug!(file_ref = %file_ref, size_bytes = size_bytes, "Source file stored");

        Ok(StoredFile {
            file_ref,
            size_bytes,
        })
    }

    fn open(&self, file_ref: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.resolve(file_ref)?;
        match std::fs::File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("source file {}", file_ref)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, file_ref: &str) -> Result<bool> {
        let path = self.resolve(file_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
