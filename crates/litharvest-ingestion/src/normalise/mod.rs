//! Shared normalisation rules and per-batch failure isolation.
//!
//! Source-specific field mapping lives next to each adapter; this module
//! holds the rules every source agrees on (year extraction, keyword sets)
//! and [`normalise_batch`], which keeps one bad item from taking down its
//! batch.

pub mod xml;

use litharvest_common::{CanonicalRecord, SourceTag};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::warn;

use crate::models::RawItem;
use crate::sources::SourceAdapter;

/// Why a single raw item could not become a record.
#[derive(Debug, Error)]
pub enum NormaliseError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("unexpected shape for '{field}': {detail}")]
    UnexpectedShape { field: &'static str, detail: String },

    #[error("non-numeric year in date '{0}'")]
    InvalidYear(String),

    #[error("{tag} adapter cannot read {kind} payloads")]
    WrongPayload { tag: SourceTag, kind: &'static str },
}

/// Year from the first four characters of a date string.
///
/// Blank → `None`. Anything whose first four characters are not all ASCII
/// digits is an error.
pub fn year_from_date(date: &str) -> Result<Option<i32>, NormaliseError> {
    let date = date.trim();
    if date.is_empty() {
        return Ok(None);
    }
    let head: String = date.chars().take(4).collect();
    if head.len() == 4 && head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse::<i32>()
            .map(Some)
            .map_err(|_| NormaliseError::InvalidYear(date.to_string()))
    } else {
        Err(NormaliseError::InvalidYear(date.to_string()))
    }
}

/// Year from a JSON number; only four-digit integers are accepted.
pub fn year_from_number(n: &serde_json::Number) -> Result<i32, NormaliseError> {
    n.as_i64()
        .and_then(|y| i32::try_from(y).ok())
        .filter(|y| (1000..=9999).contains(y))
        .ok_or_else(|| NormaliseError::InvalidYear(n.to_string()))
}

/// Trimmed, non-empty, deduplicated keywords.
pub fn keyword_set<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Outcome of normalising one batch.
#[derive(Debug, Default)]
pub struct NormalisedBatch {
    pub records: Vec<CanonicalRecord>,
    pub failures: usize,
}

/// Normalise every item; failures are logged once each and skipped.
pub fn normalise_batch(adapter: &dyn SourceAdapter, items: Vec<RawItem>) -> NormalisedBatch {
    let mut batch = NormalisedBatch {
        records: Vec::with_capacity(items.len()),
        failures: 0,
    };
    for (index, item) in items.into_iter().enumerate() {
        match adapter.normalise(item) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                warn!(source = %adapter.source(), index, error = %e, "Skipping item that failed to normalise");
                batch.failures += 1;
            }
        }
    }
    batch
}
