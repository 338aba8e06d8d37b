// sqlx::Error -> AppError mapping

use catalog_ingest_core::error::AppError;
use sqlx::error::ErrorKind;

/// Convert sqlx::Error to AppError::Persistence with structured information
pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    AppError::Persistence(describe(&err))
}

/// Transport-side failures surface as TransportError instead
pub(crate) fn map_transport_error(err: sqlx::Error) -> AppError {
    AppError::Transport(describe(&err))
}

/// Constraint failures refuse a single row; anything else fails the batch
pub(crate) fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ),
        _ => false,
    }
}

fn describe(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            match db_err.code().as_deref() {
                Some("2067") | Some("1555") => {
                    format!("Unique constraint violation: {}", db_err.message())
                }
                Some("787") => format!("Foreign key constraint violation: {}", db_err.message()),
                Some("275") => format!("Check constraint violation: {}", db_err.message()),
                Some("5") => format!("Database locked (SQLITE_BUSY): {}", db_err.message()),
                Some("13") => format!("Database full: {}", db_err.message()),
                Some(code) => format!("Database error [{}]: {}", code, db_err.message()),
                None => format!("Database error: {}", db_err.message()),
            }
        }
        sqlx::Error::RowNotFound => "Row not found".to_string(),
        sqlx::Error::ColumnNotFound(col) => format!("Column not found: {}", col),
        sqlx::Error::PoolTimedOut => "Connection pool timed out".to_string(),
        other => other.to_string(),
    }
}
