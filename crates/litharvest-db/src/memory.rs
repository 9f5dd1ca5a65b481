//! In-process record store.

use async_trait::async_trait;
use litharvest_common::CanonicalRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{RecordStore, UpsertOutcome};

/// Title-keyed map guarded by an async lock. Contents live as long as the
/// store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CanonicalRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, sorted by title.
    pub async fn all(&self) -> Vec<CanonicalRecord> {
        let mut out: Vec<_> = self.records.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.title.cmp(&b.title));
        out
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: CanonicalRecord) -> Result<UpsertOutcome> {
        let mut records = self.records.write().await;
        match records.insert(record.title.clone(), record) {
            Some(_) => Ok(UpsertOutcome::Replaced),
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    async fn exists(&self, title: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(title))
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<CanonicalRecord>> {
        Ok(self.records.read().await.get(title).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litharvest_common::SourceTag;
    use pretty_assertions::assert_eq;

    fn record(title: &str, abstract_text: &str) -> CanonicalRecord {
        let mut r = CanonicalRecord::new(title, SourceTag::OpenAlex);
        r.abstract_text = abstract_text.to_string();
        r
    }

    #[tokio::test]
    async fn test_same_title_upsert_keeps_second() {
        let store = MemoryStore::new();
        let first = store.upsert(record("Soil carbon", "first")).await.unwrap();
        let mut second = record("Soil carbon", "second");
        second.source = SourceTag::Arxiv;
        let again = store.upsert(second.clone()).await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(again, UpsertOutcome::Replaced);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.find_by_title("Soil carbon").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_exists_is_exact_match() {
        let store = MemoryStore::new();
        store.upsert(record("Graphene oxide", "")).await.unwrap();
        assert!(store.exists("Graphene oxide").await.unwrap());
        assert!(!store.exists("graphene oxide").await.unwrap());
        assert!(!store.exists("Graphene").await.unwrap());
    }

    #[tokio::test]
    async fn test_all_sorted_by_title() {
        let store = MemoryStore::new();
        store.upsert(record("b", "")).await.unwrap();
        store.upsert(record("a", "")).await.unwrap();
        let titles: Vec<_> = store.all().await.into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
