//! litharvest-common: shared types, errors, configuration and the
//! rate-limited HTTP client used across all litharvest crates.

pub mod config;
pub mod error;
pub mod http;
pub mod record;
pub mod retry;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, HttpConfig, IngestionConfig, NerConfig, StoreBackend};
pub use error::{HarvestError, Result};
pub use http::{FetchedPage, HttpSettings, RateLimitedClient, RequestFailure};
pub use record::{CanonicalRecord, EntityMap, SourceTag, UNTITLED};
pub use retry::RetryPolicy;
