// Catalog Ingest Core - Domain Logic & Ports
// NO infrastructure dependencies: adapters implement the traits in `port`

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};
