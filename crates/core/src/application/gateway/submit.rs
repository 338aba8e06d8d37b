// Submit Use Case

use crate::application::retry::with_transport_retry;
use crate::application::worker::constants::MAX_HEADER_BYTES;
use crate::domain::{CsvSchema, ImportJob, ImportMessage, JobId, SourceFileRef};
use crate::error::{AppError, Result};
use crate::port::{ByteStream, FileStore, IdProvider, JobStore, MessageTransport, TimeProvider, Topology};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::time::Duration;
use tracing::{error, info, warn};

/// Content types accepted without looking at the file name
const CSV_CONTENT_TYPES: [&str; 4] = [
    "text/csv",
    "application/csv",
    "text/plain",
    "application/vnd.ms-excel",
];

/// An uploaded file as received by the HTTP layer
pub struct Upload<'a> {
    pub file_name: String,
    pub content_type: Option<String>,
    pub body: ByteStream<'a>,
}

/// Collaborators of the submit use case
pub struct SubmitDeps<'a> {
    pub job_store: &'a dyn JobStore,
    pub file_store: &'a dyn FileStore,
    pub transport: &'a dyn MessageTransport,
    pub id_provider: &'a dyn IdProvider,
    pub time_provider: &'a dyn TimeProvider,
    pub topology: &'a Topology,
}

/// Validate, store, register and publish an upload.
///
/// Rejections (`InvalidUpload`, `SchemaMismatch`) create nothing. A publish
/// failure after local retries marks the new job Failed and returns
/// `TransportError`.
pub async fn execute(deps: &SubmitDeps<'_>, upload: Upload<'_>) -> Result<JobId> {
    check_content_type(&upload.file_name, upload.content_type.as_deref())?;

    let (head, rest) = read_header(upload.body).await?;
    let header_line = first_line(&head);
    let schema = CsvSchema::from_header_line(header_line)
        .map_err(|e| AppError::SchemaMismatch(e.to_string()))?;
    if !schema.extra_columns.is_empty() {
        warn!(
            file_name = %upload.file_name,
            extra_columns = ?schema.extra_columns,
            "Ignoring unknown header columns"
        );
    }

    let job_id = deps.id_provider.generate_id();
    let body = stream::once(async move { Ok(head) }).chain(rest).boxed();
    let stored = deps.file_store.save(&job_id, body).await?;
    info!(
        job_id = %job_id,
        file_ref = %stored.file_ref,
        size_bytes = stored.size_bytes,
        "Upload stored"
    );

    register(deps, job_id, stored.file_ref, upload.file_name).await
}

/// Register a job over an already stored file and publish its first message
pub async fn register(
    deps: &SubmitDeps<'_>,
    job_id: JobId,
    source_file_ref: SourceFileRef,
    file_name: String,
) -> Result<JobId> {
    let now = deps.time_provider.now_millis();
    let job = ImportJob::new(job_id.clone(), now, source_file_ref.clone(), file_name);
    deps.job_store.insert(&job).await?;

    let message = ImportMessage::new(job_id.clone(), source_file_ref);
    let published = with_transport_retry("publish", || {
        deps.transport.publish(
            &deps.topology.exchange,
            &deps.topology.routing_key,
            &message,
            Duration::ZERO,
        )
    })
    .await;

    match published {
        Ok(()) => {
            info!(job_id = %job_id, file_name = %job.file_name, "Import job submitted");
            Ok(job_id)
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Publishing import message failed");
            let reason = format!("publish failed: {}", e);
            let now = deps.time_provider.now_millis();
            if let Err(fail_err) = deps.job_store.fail(&job_id, &reason, now).await {
                error!(job_id = %job_id, error = %fail_err, "Could not mark job failed");
            }
            Err(e)
        }
    }
}

/// Content type must name CSV; without one (or with octet-stream) the file
/// name must end in `.csv`.
pub fn check_content_type(file_name: &str, content_type: Option<&str>) -> Result<()> {
    let essence = content_type
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    let accepted = match essence.as_deref() {
        Some(ct) if CSV_CONTENT_TYPES.contains(&ct) => true,
        None | Some("application/octet-stream") => {
            file_name.to_ascii_lowercase().ends_with(".csv")
        }
        Some(_) => false,
    };

    if accepted {
        Ok(())
    } else {
        Err(AppError::InvalidUpload(format!(
            "unsupported content type {} for {}",
            essence.as_deref().unwrap_or("(none)"),
            file_name
        )))
    }
}

/// Pull chunks until the first line break. Returns the bytes read so far
/// (header plus whatever followed in the same chunks) and the unread rest.
async fn read_header(mut body: ByteStream<'_>) -> Result<(Bytes, ByteStream<'_>)> {
    let mut head: Vec<u8> = Vec::new();
    loop {
        if head.contains(&b'\n') {
            break;
        }
        if head.len() > MAX_HEADER_BYTES {
            return Err(AppError::SchemaMismatch(format!(
                "no header line break within the first {} bytes",
                MAX_HEADER_BYTES
            )));
        }
        match body.next().await {
            Some(chunk) => head.extend_from_slice(&chunk?),
            None => break,
        }
    }
    if head.is_empty() {
        return Err(AppError::InvalidUpload("file is empty".to_string()));
    }
    Ok((Bytes::from(head), body))
}

fn first_line(head: &[u8]) -> &[u8] {
    let line = match head.iter().position(|b| *b == b'\n') {
        Some(end) => &head[..end],
        None => head,
    };
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert!(check_content_type("a.csv", Some("text/csv")).is_ok());
        assert!(check_content_type("a.txt", Some("text/csv; charset=utf-8")).is_ok());
        assert!(check_content_type("a.csv", Some("application/vnd.ms-excel")).is_ok());
        assert!(check_content_type("a.csv", None).is_ok());
        assert!(check_content_type("A.CSV", Some("application/octet-stream")).is_ok());

        assert!(check_content_type("a.bin", Some("application/octet-stream")).is_err());
        assert!(check_content_type("a.csv", Some("application/json")).is_err());
        assert!(check_content_type("a.xlsx", None).is_err());
    }

    #[test]
    fn test_first_line_strips_crlf() {
        assert_eq!(first_line(b"a,b\r\nc,d\r\n"), b"a,b");
        assert_eq!(first_line(b"a,b"), b"a,b");
    }

    #[tokio::test]
    async fn test_read_header_spans_chunks() {
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"sku,na")),
            Ok(Bytes::from_static(b"me\nrow1\n")),
            Ok(Bytes::from_static(b"row2\n")),
        ];
        let (head, rest) = read_header(stream::iter(chunks).boxed()).await.unwrap();
        assert_eq!(&head[..], b"sku,name\nrow1\n");
        let rest: Vec<_> = rest.collect().await;
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn test_read_header_bounded() {
        let chunk = Bytes::from(vec![b'x'; 16 * 1024]);
        let body = stream::repeat_with(move || Ok(chunk.clone())).boxed();
        assert!(matches!(
            read_header(body).await,
            Err(AppError::SchemaMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_body_is_invalid_upload() {
        let body = stream::empty().boxed();
        assert!(matches!(
            read_header(body).await,
            Err(AppError::InvalidUpload(_))
        ));
    }
}
