//! litharvest database layer.
//!
//! One logical collection of [`CanonicalRecord`](litharvest_common::CanonicalRecord)
//! documents keyed by title, behind the [`RecordStore`] contract. Two
//! backends: an in-process map for tests and one-off runs, and PostgreSQL.
//!
//! # Example
//!
//! ```rust,no_run
//! use litharvest_common::DatabaseConfig;
//! use litharvest_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open(&DatabaseConfig::default()).await?;
//!     let stored = db.store().count().await?;
//!     println!("{stored} records");
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use database::Database;
pub use error::{DbError, Result};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{RecordStore, UpsertOutcome};
