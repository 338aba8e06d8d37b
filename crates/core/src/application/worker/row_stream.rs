// Blocking CSV reader feeding bounded row chunks to the async worker

use crate::domain::{CsvSchema, Product, RowValidationError};
use crate::error::{AppError, Result};
use csv::StringRecord;
use std::io::Read;
use tokio::sync::mpsc;
use tracing::debug;

/// One data row after parsing
#[derive(Debug, Clone)]
pub struct ParsedRow {
    /// 1-based data row number
    pub row_number: i64,
    pub sku: String,
    pub parsed: std::result::Result<Product, String>,
}

pub type RowChunk = Vec<ParsedRow>;

/// Read `source` and send chunks of at most `batch_size` data rows.
///
/// Runs on a blocking thread (`spawn_blocking`). The first `skip_rows` data
/// rows are skipped without parsing (resume after committed progress).
/// Malformed records become invalid rows; only I/O failures are returned
/// as errors. A dropped receiver ends the read early with `Ok`.
pub fn read_chunks(
    source: Box<dyn Read + Send>,
    batch_size: usize,
    skip_rows: i64,
    tx: mpsc::Sender<RowChunk>,
) -> Result<()> {
    let batch_size = batch_size.max(1);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut record = StringRecord::new();
    let schema = match reader.read_record(&mut record) {
        Ok(true) => CsvSchema::from_header(&record)
            .map_err(|e| AppError::SchemaMismatch(e.to_string()))?,
        Ok(false) => return Err(AppError::SchemaMismatch("source file is empty".to_string())),
        Err(e) => return Err(csv_error(e)),
    };

    let mut row_number: i64 = 0;
    let mut chunk: RowChunk = Vec::with_capacity(batch_size);

    loop {
        let row = match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                row_number += 1;
                if row_number <= skip_rows {
                    continue;
                }
                ParsedRow {
                    row_number,
                    sku: schema.sku_of(&record).to_string(),
                    parsed: schema.parse_record(&record).map_err(|e| e.to_string()),
                }
            }
            Err(e) if e.is_io_error() => return Err(csv_error(e)),
            Err(e) => {
                row_number += 1;
                if row_number <= skip_rows {
                    continue;
                }
                ParsedRow {
                    row_number,
                    sku: String::new(),
                    parsed: Err(RowValidationError::MalformedRecord(e.to_string()).to_string()),
                }
            }
        };

        chunk.push(row);
        if chunk.len() == batch_size {
            let full = std::mem::replace(&mut chunk, Vec::with_capacity(batch_size));
            if tx.blocking_send(full).is_err() {
                debug!(row_number = row_number, "Row consumer gone, stopping reader");
                return Ok(());
            }
        }
    }

    if !chunk.is_empty() && tx.blocking_send(chunk).is_err() {
        debug!("Row consumer gone before the last chunk");
    }
    Ok(())
}

fn csv_error(e: csv::Error) -> AppError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => AppError::Io(io),
            other => AppError::Internal(format!("{:?}", other)),
        }
    } else {
        AppError::Internal(format!("csv: {}", e))
    }
}
