//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Database configuration error: {0}")]
    Config(String),
}
