//! SQLite source adapter.
//!
//! Reads query results with rusqlite (through tokio-rusqlite's background
//! thread) and maps declared column types onto scalar kinds for the encoder.

pub mod connection;
pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

// Public API re-exports for library consumers
pub use connection::{QuerySpec, SqliteSource};
pub use error::{SqliteError, SqliteResult};
pub use types::{DeclaredType, SqliteValue};
