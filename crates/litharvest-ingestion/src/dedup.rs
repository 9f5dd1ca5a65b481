//! Pre-enrichment duplicate check against the record store.

use litharvest_db::RecordStore;
use std::sync::Arc;
use tracing::warn;

/// Asks the store whether a title is already persisted.
///
/// Advisory only: the title-keyed upsert stays authoritative, so a store
/// error here is logged and treated as "not present".
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn RecordStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn exists(&self, title: &str) -> bool {
        match self.store.exists(title).await {
            Ok(found) => found,
            Err(e) => {
                warn!(title, error = %e, "Dedup check failed, treating title as new");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use litharvest_common::{CanonicalRecord, SourceTag};
    use litharvest_db::{DbError, MemoryStore, UpsertOutcome};

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn upsert(&self, _record: CanonicalRecord) -> litharvest_db::Result<UpsertOutcome> {
            Err(DbError::InvalidRow("down".into()))
        }
        async fn exists(&self, _title: &str) -> litharvest_db::Result<bool> {
            Err(DbError::InvalidRow("down".into()))
        }
        async fn find_by_title(&self, _title: &str) -> litharvest_db::Result<Option<CanonicalRecord>> {
            Ok(None)
        }
        async fn count(&self) -> litharvest_db::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_gate_reports_stored_titles() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(CanonicalRecord::new("Known", SourceTag::Arxiv)).await.unwrap();
        let gate = DedupGate::new(store);
        assert!(gate.exists("Known").await);
        assert!(!gate.exists("Unknown").await);
    }

    #[tokio::test]
    async fn test_store_error_counts_as_absent() {
        let gate = DedupGate::new(Arc::new(BrokenStore));
        assert!(!gate.exists("anything").await);
    }
}
