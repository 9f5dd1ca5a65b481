//! Scilit search API client. Single call with `q` and `limit`.

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, RateLimitedClient, SourceTag};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{BatchSink, SourceAdapter};
use crate::models::{RawItem, RawPayload};
use crate::normalise::{clean_text, keyword_set, year_from_date, year_from_number, NormaliseError};

const SCILIT_URL: &str = "https://scilit.net/api/v1/search";

pub struct ScilitAdapter {
    client: RateLimitedClient,
    base_url: String,
}

impl ScilitAdapter {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client, base_url: SCILIT_URL.to_string() }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for ScilitAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Scilit
    }

    #[instrument(skip(self, sink))]
    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink) {
        if sink.should_stop() || max_results == 0 {
            return;
        }

        let params = [("q", query.to_string()), ("limit", max_results.to_string())];
        let body = match self.client.fetch(&self.base_url, &params).await {
            Ok(resp) => resp.body,
            Err(e) => {
                sink.batch_failed(&e.to_string());
                return;
            }
        };

        let results = match serde_json::from_str::<Value>(&body) {
            Ok(mut data) => match data.get_mut("results").map(Value::take) {
                Some(Value::Array(results)) => results,
                _ => Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, "Scilit response is not JSON");
                sink.batch_failed(&e.to_string());
                return;
            }
        };

        debug!(n = results.len(), "Scilit results received");
        let items = results
            .into_iter()
            .take(max_results)
            .map(|item| RawItem::json(SourceTag::Scilit, item))
            .collect();
        sink.accept(items).await;
    }

    fn normalise(&self, item: RawItem) -> Result<CanonicalRecord, NormaliseError> {
        match item.payload {
            RawPayload::Json(value) => item_to_record(&value),
            other => Err(NormaliseError::WrongPayload { tag: SourceTag::Scilit, kind: other.kind() }),
        }
    }
}

fn str_field<'a>(item: &'a Value, field: &'static str) -> Result<&'a str, NormaliseError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(NormaliseError::UnexpectedShape { field, detail: other.to_string() }),
    }
}

fn item_to_record(item: &Value) -> Result<CanonicalRecord, NormaliseError> {
    if !item.is_object() {
        return Err(NormaliseError::UnexpectedShape { field: "result", detail: item.to_string() });
    }

    let mut record = CanonicalRecord::new(str_field(item, "title")?, SourceTag::Scilit);

    // authors are either plain strings or {"name": …} objects
    record.authors = item["authors"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|a| a.as_str().or_else(|| a["name"].as_str()))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();

    record.year = match item.get("year") {
        Some(Value::Number(n)) => Some(year_from_number(n)?),
        Some(Value::String(s)) => year_from_date(s)?,
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(NormaliseError::UnexpectedShape { field: "year", detail: other.to_string() })
        }
    };

    record.journal = str_field(item, "journal")?.trim().to_string();
    record.abstract_text = clean_text(str_field(item, "abstract")?);
    record.link = str_field(item, "doi")?.to_string();
    record.keywords = keyword_set(item["keywords"].as_array().into_iter().flatten().filter_map(Value::as_str));

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_item_fields() {
        let record = item_to_record(&json!({
            "title": "Biochar and yields",
            "authors": [{"name": "A. Smith"}, "B. Jones", {"name": null}],
            "year": "2018",
            "journal": "Soil Use",
            "abstract": "Biochar  raises yields.",
            "doi": "10.1/abc",
            "keywords": ["biochar", "yield", "biochar"]
        }))
        .unwrap();

        assert_eq!(record.title, "Biochar and yields");
        assert_eq!(record.authors, vec!["A. Smith", "B. Jones"]);
        assert_eq!(record.year, Some(2018));
        assert_eq!(record.journal, "Soil Use");
        assert_eq!(record.abstract_text, "Biochar raises yields.");
        assert_eq!(record.link, "10.1/abc");
        assert_eq!(record.keywords.len(), 2);
    }

    #[test]
    fn test_numeric_year_and_missing_fields() {
        let record = item_to_record(&json!({"year": 2011})).unwrap();
        assert_eq!(record.title, "Untitled");
        assert_eq!(record.year, Some(2011));
        assert_eq!(record.journal, "");
    }

    #[test]
    fn test_bad_year_fails_item() {
        assert!(item_to_record(&json!({"title": "t", "year": "n.d."})).is_err());
        assert!(item_to_record(&json!({"title": "t", "year": [2011]})).is_err());
    }

    #[test]
    fn test_out_of_range_numeric_year_fails_item() {
        let err = item_to_record(&json!({"title": "t", "year": 4_294_969_307_i64})).unwrap_err();
        assert!(matches!(err, NormaliseError::InvalidYear(_)));
        assert!(item_to_record(&json!({"title": "t", "year": -12})).is_err());
    }
}
