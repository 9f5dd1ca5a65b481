//! Raw items as delivered by source adapters, before normalisation.

use litharvest_common::SourceTag;
use serde::{Deserialize, Serialize};

/// One fetched item, still in its source's shape.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub source: SourceTag,
    pub payload: RawPayload,
}

#[derive(Debug, Clone)]
pub enum RawPayload {
    /// A single item element serialised back to XML (`<entry>…</entry>`).
    Xml(String),
    /// One element of a JSON `results` array.
    Json(serde_json::Value),
    /// Fields scraped from one container element of an HTML listing page.
    Listing(ListingItem),
}

impl RawPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RawPayload::Xml(_) => "xml",
            RawPayload::Json(_) => "json",
            RawPayload::Listing(_) => "listing",
        }
    }
}

/// Text pulled out of an HTML result entry. Missing elements are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    pub title: String,
    pub link: String,
    pub authors: Vec<String>,
    /// Raw year text, e.g. `"2019"` or `"(2019)"`.
    pub year: String,
    pub journal: String,
}

impl RawItem {
    pub fn xml(source: SourceTag, fragment: impl Into<String>) -> Self {
        Self { source, payload: RawPayload::Xml(fragment.into()) }
    }

    pub fn json(source: SourceTag, value: serde_json::Value) -> Self {
        Self { source, payload: RawPayload::Json(value) }
    }

    pub fn listing(source: SourceTag, item: ListingItem) -> Self {
        Self { source, payload: RawPayload::Listing(item) }
    }
}
