//! arXiv Atom API client.
//!
//! Endpoint: http://export.arxiv.org/api/query
//! One request per run; every `<entry>` of the feed becomes a raw item.

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, RateLimitedClient, SourceTag};
use tracing::{debug, instrument, warn};

use super::{BatchSink, SourceAdapter};
use crate::models::{RawItem, RawPayload};
use crate::normalise::xml::{parse_fragment, split_elements, XmlNode};
use crate::normalise::{clean_text, keyword_set, year_from_date, NormaliseError};

const ARXIV_URL: &str = "http://export.arxiv.org/api/query";
const ARXIV_JOURNAL: &str = "ArXiv";

pub struct ArxivAdapter {
    client: RateLimitedClient,
    base_url: String,
}

impl ArxivAdapter {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client, base_url: ARXIV_URL.to_string() }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Arxiv
    }

    #[instrument(skip(self, sink))]
    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink) {
        if sink.should_stop() || max_results == 0 {
            return;
        }

        let params = [
            ("search_query", query.to_string()),
            ("max_results", max_results.to_string()),
        ];
        let page = match self.client.fetch(&self.base_url, &params).await {
            Ok(page) => page,
            Err(e) => {
                sink.batch_failed(&e.to_string());
                return;
            }
        };

        let entries = match split_elements(&page.body, "entry") {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "arXiv feed unreadable");
                sink.batch_failed(&e.to_string());
                return;
            }
        };

        debug!(n = entries.len(), "arXiv entries received");
        let items = entries
            .into_iter()
            .take(max_results)
            .map(|fragment| RawItem::xml(SourceTag::Arxiv, fragment))
            .collect();
        sink.accept(items).await;
    }

    fn normalise(&self, item: RawItem) -> Result<CanonicalRecord, NormaliseError> {
        match item.payload {
            RawPayload::Xml(fragment) => entry_to_record(&parse_fragment(&fragment)?),
            other => Err(NormaliseError::WrongPayload { tag: SourceTag::Arxiv, kind: other.kind() }),
        }
    }
}

/// Map one Atom `<entry>` to a record.
fn entry_to_record(entry: &XmlNode) -> Result<CanonicalRecord, NormaliseError> {
    let mut record = CanonicalRecord::new(&entry.child_text("title").unwrap_or_default(), SourceTag::Arxiv);

    record.authors = entry
        .children("author")
        .filter_map(|a| a.child_text("name"))
        .filter(|n| !n.is_empty())
        .collect();
    record.year = year_from_date(&entry.child_text("published").unwrap_or_default())?;
    record.journal = ARXIV_JOURNAL.to_string();
    record.abstract_text = clean_text(&entry.child_text("summary").unwrap_or_default());
    record.link = entry.child_text("id").unwrap_or_default();
    record.keywords = keyword_set(entry.children("category").filter_map(|c| c.attr("term")));

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(xml: &str) -> Result<CanonicalRecord, NormaliseError> {
        entry_to_record(&parse_fragment(xml).unwrap())
    }

    #[test]
    fn test_entry_fields() {
        let record = parse(
            r#"<entry>
                <id>http://arxiv.org/abs/2101.00001v1</id>
                <published>2021-01-01T00:00:00Z</published>
                <title>Graph  networks
                  for soil</title>
                <summary>  We study soil. </summary>
                <author><name>Ada Lovelace</name></author>
                <author><name>Alan Turing</name></author>
                <category term="cs.LG"/>
                <category term="stat.ML"/>
                <category term="cs.LG"/>
            </entry>"#,
        )
        .unwrap();

        assert_eq!(record.title, "Graph networks for soil");
        assert_eq!(record.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(record.year, Some(2021));
        assert_eq!(record.journal, "ArXiv");
        assert_eq!(record.abstract_text, "We study soil.");
        assert_eq!(record.link, "http://arxiv.org/abs/2101.00001v1");
        assert_eq!(record.keywords.len(), 2);
        assert!(record.entities.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let record = parse("<entry></entry>").unwrap();
        assert_eq!(record.title, "Untitled");
        assert!(record.authors.is_empty());
        assert_eq!(record.year, None);
        assert_eq!(record.abstract_text, "");
        assert_eq!(record.link, "");
    }

    #[test]
    fn test_bad_published_date_fails_item() {
        let err = parse("<entry><title>x</title><published>unknown</published></entry>").unwrap_err();
        assert!(matches!(err, NormaliseError::InvalidYear(_)));
    }
}
