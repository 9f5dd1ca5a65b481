//! Source adapters.

pub mod arxiv;
pub mod entrez;
pub mod listing;
pub mod openalex;
pub mod scilit;

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, HttpSettings, IngestionConfig, RateLimitedClient, Result, SourceTag};

use crate::models::RawItem;
use crate::normalise::{normalise_batch, NormaliseError, NormalisedBatch};

pub use arxiv::ArxivAdapter;
pub use entrez::{EntrezAdapter, EntrezDb};
pub use listing::{ListingAdapter, ListingProfile};
pub use openalex::OpenAlexAdapter;
pub use scilit::ScilitAdapter;

/// Receives raw items one page/batch at a time.
///
/// Adapters await `accept` before issuing their next request, so whatever
/// the sink does with a batch is finished before more is fetched.
#[async_trait]
pub trait BatchSink: Send {
    async fn accept(&mut self, items: Vec<RawItem>);

    /// A page/batch produced nothing because its request or payload failed.
    fn batch_failed(&mut self, reason: &str);

    /// Checked by adapters before every request.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Common interface for all bibliographic sources.
///
/// `fetch` never fails past its boundary: request and payload failures are
/// reported to the sink through [`BatchSink::batch_failed`] and the adapter
/// moves on to its next page/batch.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceTag;

    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink);

    fn normalise(&self, item: RawItem) -> std::result::Result<CanonicalRecord, NormaliseError>;
}

/// Sink that just keeps everything.
#[derive(Debug, Default)]
pub struct VecSink {
    pub items: Vec<RawItem>,
    pub batches: usize,
    pub failed_batches: usize,
}

#[async_trait]
impl BatchSink for VecSink {
    async fn accept(&mut self, items: Vec<RawItem>) {
        self.batches += 1;
        self.items.extend(items);
    }

    fn batch_failed(&mut self, _reason: &str) {
        self.failed_batches += 1;
    }
}

/// Run an adapter to completion and return every raw item it produced.
pub async fn collect_raw(adapter: &dyn SourceAdapter, query: &str, max_results: usize) -> Vec<RawItem> {
    let mut sink = VecSink::default();
    adapter.fetch(query, max_results, &mut sink).await;
    sink.items
}

/// Fetch and normalise without gating or persisting.
pub async fn fetch_records(adapter: &dyn SourceAdapter, query: &str, max_results: usize) -> NormalisedBatch {
    let items = collect_raw(adapter, query, max_results).await;
    normalise_batch(adapter, items)
}

/// Build the adapter for `tag`, with its own request client.
pub fn build_adapter(
    tag: SourceTag,
    config: &IngestionConfig,
    settings: &HttpSettings,
) -> Result<Box<dyn SourceAdapter>> {
    let client = RateLimitedClient::new(settings.clone())?;
    let base = config.endpoint(tag).map(str::to_string);

    let adapter: Box<dyn SourceAdapter> = match tag {
        SourceTag::Arxiv => {
            let mut a = ArxivAdapter::new(client);
            if let Some(url) = base {
                a = a.with_base_url(url);
            }
            Box::new(a)
        }
        SourceTag::OpenAlex => {
            let mut a = OpenAlexAdapter::new(client, config.contact_email.clone())
                .with_page_size(config.openalex_page_size);
            if let Some(url) = base {
                a = a.with_base_url(url);
            }
            Box::new(a)
        }
        SourceTag::PubMed | SourceTag::Medline => {
            let db = if tag == SourceTag::PubMed { EntrezDb::PubMed } else { EntrezDb::Medline };
            let mut a = EntrezAdapter::new(client, db)
                .with_batch_size(config.entrez_batch_size)
                .with_api_key(config.entrez_api_key.clone());
            if let Some(url) = base {
                a = a.with_base_url(url);
            }
            Box::new(a)
        }
        SourceTag::Scilit => {
            let mut a = ScilitAdapter::new(client);
            if let Some(url) = base {
                a = a.with_base_url(url);
            }
            Box::new(a)
        }
        SourceTag::GoogleScholar
        | SourceTag::Springer
        | SourceTag::Hal
        | SourceTag::ResearchGate
        | SourceTag::CiteSeerX => {
            let profile = ListingProfile::for_source(tag).ok_or_else(|| {
                litharvest_common::HarvestError::Config(format!("no listing profile for {tag}"))
            })?;
            let mut a = ListingAdapter::new(client, profile)?;
            if let Some(url) = base {
                a = a.with_base_url(url);
            }
            Box::new(a)
        }
    };
    Ok(adapter)
}

/// One adapter per configured source, in configuration order.
pub fn build_adapters(config: &IngestionConfig, settings: &HttpSettings) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let mut seen = std::collections::BTreeSet::new();
    config
        .sources
        .iter()
        .filter(|tag| seen.insert(**tag))
        .map(|tag| build_adapter(*tag, config, settings))
        .collect()
}
