//! Catalog Ingest HTTP API
//!
//! Routes:
//! - `POST /imports` (multipart field `file`) -> `202 {jobId}`
//! - `GET /imports/:id`, `GET /imports/:id/errors`, `POST /imports/:id/cancel`
//! - `GET /admin/stats`, `GET /admin/dead-letters`, `POST /admin/dead-letters/:id/replay`
//! - `GET /healthz`

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use error::{ApiError, ErrorBody};
pub use handler::AppState;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use server::{router, serve, HttpConfig};

#[cfg(test)]
mod tests;
