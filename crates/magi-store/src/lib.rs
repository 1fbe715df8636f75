//! SQLite-backed session ledger and outcome statistics.

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::{EvaluatedTrade, PendingTrade, SqliteStore};
