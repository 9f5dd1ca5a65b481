//! OpenAlex works API client.
//!
//! Endpoint: https://api.openalex.org/works
//! Paged with `per_page`/`page`; each page is handed to the sink before the
//! next one is requested.

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, RateLimitedClient, SourceTag};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{BatchSink, SourceAdapter};
use crate::models::{RawItem, RawPayload};
use crate::normalise::{clean_text, keyword_set, year_from_date, year_from_number, NormaliseError};

const OPENALEX_URL: &str = "https://api.openalex.org/works";
const DEFAULT_PAGE_SIZE: usize = 200;

pub struct OpenAlexAdapter {
    client: RateLimitedClient,
    base_url: String,
    mailto: Option<String>,
    page_size: usize,
}

impl OpenAlexAdapter {
    pub fn new(client: RateLimitedClient, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: OPENALEX_URL.to_string(),
            mailto,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Upper bound on page requests for `max_results`.
    pub fn max_pages(&self, max_results: usize) -> usize {
        max_results / self.page_size + 1
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::OpenAlex
    }

    #[instrument(skip(self, sink))]
    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink) {
        let mut collected = 0usize;

        for page in 1..=self.max_pages(max_results) {
            if sink.should_stop() || collected >= max_results {
                break;
            }

            let mut params = vec![
                ("filter", format!("title.search:{query}")),
                ("per_page", self.page_size.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(mailto) = &self.mailto {
                params.push(("mailto", mailto.clone()));
            }

            let body = match self.client.fetch(&self.base_url, &params).await {
                Ok(resp) => resp.body,
                Err(e) => {
                    sink.batch_failed(&e.to_string());
                    continue;
                }
            };
            let mut data: Value = match serde_json::from_str(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!(page, error = %e, "OpenAlex page is not JSON");
                    sink.batch_failed(&e.to_string());
                    continue;
                }
            };

            let results = match data.get_mut("results").map(Value::take) {
                Some(Value::Array(results)) => results,
                _ => Vec::new(),
            };
            if results.is_empty() {
                debug!(page, "OpenAlex returned an empty page");
                break;
            }

            let short_page = results.len() < self.page_size;
            let items: Vec<RawItem> = results
                .into_iter()
                .take(max_results - collected)
                .map(|work| RawItem::json(SourceTag::OpenAlex, work))
                .collect();
            collected += items.len();
            debug!(page, n = items.len(), collected, "OpenAlex page received");
            sink.accept(items).await;

            if short_page {
                break;
            }
        }

        info!(collected, "OpenAlex fetch finished");
    }

    fn normalise(&self, item: RawItem) -> Result<CanonicalRecord, NormaliseError> {
        match item.payload {
            RawPayload::Json(work) => work_to_record(&work),
            other => Err(NormaliseError::WrongPayload { tag: SourceTag::OpenAlex, kind: other.kind() }),
        }
    }
}

fn optional_str<'a>(work: &'a Value, field: &'static str) -> Result<Option<&'a str>, NormaliseError> {
    match work.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(NormaliseError::UnexpectedShape { field, detail: other.to_string() }),
    }
}

/// Map an OpenAlex `work` object to a record.
fn work_to_record(work: &Value) -> Result<CanonicalRecord, NormaliseError> {
    if !work.is_object() {
        return Err(NormaliseError::UnexpectedShape { field: "work", detail: work.to_string() });
    }

    let title = optional_str(work, "title")?.unwrap_or_default();
    let mut record = CanonicalRecord::new(title, SourceTag::OpenAlex);

    record.authors = work["authorships"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| a["author"]["display_name"].as_str())
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    record.year = match work.get("publication_year") {
        Some(Value::Number(n)) => Some(year_from_number(n)?),
        _ => year_from_date(optional_str(work, "publication_date")?.unwrap_or_default())?,
    };

    record.journal = work["primary_location"]["source"]["display_name"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    record.abstract_text = match optional_str(work, "abstract")? {
        Some(text) => clean_text(text),
        None => rebuild_abstract(&work["abstract_inverted_index"]),
    };

    record.link = optional_str(work, "doi")?
        .or(optional_str(work, "id")?)
        .unwrap_or_default()
        .to_string();

    record.keywords = keyword_set(
        work["keywords"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|k| k["display_name"].as_str()),
    );

    Ok(record)
}

/// Rebuild plain text from `{"word": [positions…]}`.
fn rebuild_abstract(index: &Value) -> String {
    let Some(map) = index.as_object() else {
        return String::new();
    };
    let mut positioned: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    positioned.sort_by_key(|(pos, _)| *pos);
    positioned.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}
