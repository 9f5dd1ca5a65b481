//! Store lifecycle: open from configuration, hand out the store, close.

use litharvest_common::{DatabaseConfig, StoreBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{DbError, Result};
use crate::memory::MemoryStore;
use crate::postgres::PgStore;
use crate::store::RecordStore;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle.
pub struct Database {
    store: Arc<dyn RecordStore>,
    connection: Option<JoinHandle<()>>,
}

impl Database {
    /// Open the configured backend.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Memory => {
                info!("Using in-memory record store");
                Ok(Self::in_memory())
            }
            StoreBackend::Postgres => {
                let url = config.url.as_deref().ok_or_else(|| {
                    DbError::Config("database.url is required for the postgres backend".into())
                })?;
                let (store, handle) = PgStore::connect(url, &config.table).await?;
                Ok(Self { store: Arc::new(store), connection: Some(handle) })
            }
        }
    }

    pub fn in_memory() -> Self {
        Self { store: Arc::new(MemoryStore::new()), connection: None }
    }

    /// Wrap an already-built store (no connection to drive).
    pub fn from_store(store: Arc<dyn RecordStore>) -> Self {
        Self { store, connection: None }
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    /// Drop this handle's store reference and wait for the connection driver
    /// to finish. Callers must drop their own clones of [`Database::store`]
    /// first for the connection to actually close.
    pub async fn close(self) {
        let Self { store, connection } = self;
        drop(store);
        if let Some(handle) = connection {
            match tokio::time::timeout(CLOSE_TIMEOUT, handle).await {
                Ok(Ok(())) => info!("Database connection closed"),
                Ok(Err(e)) => warn!(error = %e, "Database connection task failed"),
                Err(_) => warn!("Database connection still open after close timeout"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litharvest_common::{CanonicalRecord, SourceTag};

    #[tokio::test]
    async fn test_default_config_opens_memory_store() {
        let db = Database::open(&DatabaseConfig::default()).await.unwrap();
        let store = db.store();
        store.upsert(CanonicalRecord::new("A", SourceTag::Hal)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        drop(store);
        db.close().await;
    }

    #[tokio::test]
    async fn test_postgres_without_url_is_config_error() {
        let cfg = DatabaseConfig {
            backend: StoreBackend::Postgres,
            url: None,
            table: "publications".into(),
        };
        assert!(matches!(Database::open(&cfg).await, Err(DbError::Config(_))));
    }
}
