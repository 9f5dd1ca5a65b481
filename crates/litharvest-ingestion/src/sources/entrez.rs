//! NCBI Entrez E-utilities client (PubMed and MEDLINE).
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!
//! Two phases: esearch returns up to `max_results` ids, then efetch is
//! called once per batch of ids (100 by default).

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, RateLimitedClient, SourceTag};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument, warn};

use super::{BatchSink, SourceAdapter};
use crate::models::{RawItem, RawPayload};
use crate::normalise::xml::{parse_fragment, split_elements, XmlNode};
use crate::normalise::{clean_text, keyword_set, year_from_date, NormaliseError};

const EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DEFAULT_BATCH_SIZE: usize = 100;

/// Which Entrez database to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrezDb {
    PubMed,
    Medline,
}

impl EntrezDb {
    pub fn db_name(&self) -> &'static str {
        match self {
            EntrezDb::PubMed  => "pubmed",
            EntrezDb::Medline => "medline",
        }
    }

    /// Element wrapping one article in efetch output.
    pub fn item_tag(&self) -> &'static str {
        match self {
            EntrezDb::PubMed  => "PubmedArticle",
            EntrezDb::Medline => "MedlineCitation",
        }
    }

    pub fn source_tag(&self) -> SourceTag {
        match self {
            EntrezDb::PubMed  => SourceTag::PubMed,
            EntrezDb::Medline => SourceTag::Medline,
        }
    }
}

pub struct EntrezAdapter {
    client: RateLimitedClient,
    db: EntrezDb,
    base_url: String,
    batch_size: usize,
    api_key: Option<SecretString>,
}

impl EntrezAdapter {
    pub fn new(client: RateLimitedClient, db: EntrezDb) -> Self {
        Self {
            client,
            db,
            base_url: EUTILS_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            api_key: None,
        }
    }

    /// Base of the E-utilities; `/esearch.fcgi` and `/efetch.fcgi` are appended.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    fn push_api_key(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
    }

    /// Phase 1: ids matching `query`, at most `max`.
    #[instrument(skip(self, sink))]
    async fn esearch(&self, query: &str, max: usize, sink: &mut dyn BatchSink) -> Vec<String> {
        let mut params = vec![
            ("db", self.db.db_name().to_string()),
            ("term", query.to_string()),
            ("retmax", max.to_string()),
        ];
        self.push_api_key(&mut params);

        let url = format!("{}/esearch.fcgi", self.base_url);
        let body = match self.client.fetch(&url, &params).await {
            Ok(resp) => resp.body,
            Err(e) => {
                sink.batch_failed(&e.to_string());
                return Vec::new();
            }
        };

        match parse_id_list(&body) {
            Ok(mut ids) => {
                ids.truncate(max);
                debug!(n = ids.len(), db = self.db.db_name(), "Entrez esearch returned ids");
                ids
            }
            Err(e) => {
                warn!(error = %e, "Entrez esearch response unreadable");
                sink.batch_failed(&e.to_string());
                Vec::new()
            }
        }
    }

    /// Phase 2: one efetch for a batch of ids, split into per-article fragments.
    async fn efetch(&self, ids: &[String]) -> Result<Vec<String>, String> {
        let mut params = vec![
            ("db", self.db.db_name().to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        self.push_api_key(&mut params);

        let url = format!("{}/efetch.fcgi", self.base_url);
        let body = self
            .client
            .fetch(&url, &params)
            .await
            .map_err(|e| e.to_string())?
            .body;

        split_elements(&body, self.db.item_tag()).map_err(|e| {
            warn!(error = %e, "Entrez efetch response unreadable");
            e.to_string()
        })
    }
}

#[async_trait]
impl SourceAdapter for EntrezAdapter {
    fn source(&self) -> SourceTag {
        self.db.source_tag()
    }

    #[instrument(skip(self, sink))]
    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink) {
        if sink.should_stop() || max_results == 0 {
            return;
        }

        let ids = self.esearch(query, max_results, sink).await;
        let batches = ids.chunks(self.batch_size).count();
        info!(ids = ids.len(), batches, "Fetching Entrez details");

        for (n, chunk) in ids.chunks(self.batch_size).enumerate() {
            if sink.should_stop() {
                break;
            }
            match self.efetch(chunk).await {
                Ok(fragments) => {
                    debug!(batch = n + 1, ids = chunk.len(), articles = fragments.len(), "Entrez batch received");
                    let tag = self.source();
                    let items = fragments.into_iter().map(|f| RawItem::xml(tag, f)).collect();
                    sink.accept(items).await;
                }
                Err(reason) => sink.batch_failed(&reason),
            }
        }
    }

    fn normalise(&self, item: RawItem) -> Result<CanonicalRecord, NormaliseError> {
        match item.payload {
            RawPayload::Xml(fragment) => article_to_record(&parse_fragment(&fragment)?, self.source()),
            other => Err(NormaliseError::WrongPayload { tag: self.source(), kind: other.kind() }),
        }
    }
}

fn parse_id_list(body: &str) -> Result<Vec<String>, NormaliseError> {
    let root = parse_fragment(body)?;
    let list = root.child("IdList").ok_or_else(|| NormaliseError::UnexpectedShape {
        field: "IdList",
        detail: format!("missing from <{}>", root.name),
    })?;
    Ok(list
        .children("Id")
        .map(XmlNode::text)
        .filter(|id| !id.is_empty())
        .collect())
}

/// Map a `PubmedArticle` or bare `MedlineCitation` element to a record.
fn article_to_record(node: &XmlNode, source: SourceTag) -> Result<CanonicalRecord, NormaliseError> {
    let citation = if node.name == "MedlineCitation" {
        node
    } else {
        node.child("MedlineCitation").ok_or_else(|| NormaliseError::UnexpectedShape {
            field: "MedlineCitation",
            detail: format!("missing from <{}>", node.name),
        })?
    };
    let article = citation.child("Article").ok_or_else(|| NormaliseError::UnexpectedShape {
        field: "Article",
        detail: "missing from <MedlineCitation>".into(),
    })?;

    let mut record = CanonicalRecord::new(&article.child_text("ArticleTitle").unwrap_or_default(), source);

    record.authors = article
        .find(&["AuthorList"])
        .map(|list| list.children("Author").filter_map(author_name).collect())
        .unwrap_or_default();

    let pub_date = article.find(&["Journal", "JournalIssue", "PubDate"]);
    let date_text = pub_date
        .and_then(|d| d.child_text("Year").or_else(|| d.child_text("MedlineDate")))
        .unwrap_or_default();
    record.year = year_from_date(&date_text)?;

    record.journal = article.find(&["Journal", "Title"]).map(XmlNode::text).unwrap_or_default();

    record.abstract_text = article
        .find(&["Abstract"])
        .map(|abs| {
            let parts: Vec<String> = abs.children("AbstractText").map(|t| t.text()).collect();
            clean_text(&parts.join(" "))
        })
        .unwrap_or_default();

    record.link = citation
        .child_text("PMID")
        .filter(|pmid| !pmid.is_empty())
        .map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"))
        .unwrap_or_default();

    record.keywords = keyword_set(
        citation
            .children("KeywordList")
            .flat_map(|list| list.children("Keyword"))
            .map(XmlNode::text),
    );

    Ok(record)
}

/// `"<LastName> <ForeName>"`, or `None` when either part is missing.
fn author_name(author: &XmlNode) -> Option<String> {
    let last = author.child_text("LastName").filter(|s| !s.is_empty())?;
    let fore = author.child_text("ForeName").filter(|s| !s.is_empty())?;
    Some(format!("{last} {fore}").trim().to_string())
}
