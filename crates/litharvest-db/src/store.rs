//! The persistence contract the pipeline writes through.

use async_trait::async_trait;
use litharvest_common::CanonicalRecord;

use crate::error::Result;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A record with the same title existed and was overwritten.
    Replaced,
}

/// Title-keyed record collection.
///
/// `upsert` takes ownership: after hand-off the store is the sole owner of
/// the record. Replacing overwrites every field; nothing is merged.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&self, record: CanonicalRecord) -> Result<UpsertOutcome>;

    /// Exact-match title lookup.
    async fn exists(&self, title: &str) -> Result<bool>;

    async fn find_by_title(&self, title: &str) -> Result<Option<CanonicalRecord>>;

    async fn count(&self) -> Result<usize>;
}
