//! HTML result-listing scrapers (Google Scholar, Springer, HAL,
//! ResearchGate, CiteSeerX).
//!
//! Each site is described by a static [`ListingProfile`]: where to send the
//! query, how it paginates and which CSS selectors pick out the result
//! containers and their fields. One adapter type serves all five.

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, HarvestError, RateLimitedClient, Result, SourceTag};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{BatchSink, SourceAdapter};
use crate::models::{ListingItem, RawItem, RawPayload};
use crate::normalise::{clean_text, year_from_date, NormaliseError};

/// How a listing site paginates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// One request per `step` results; the offset goes in `param`.
    Offset { param: &'static str, step: usize },
    /// One request asking for up to `max_results` via `limit_param`.
    Single { limit_param: &'static str },
}

/// Where author names come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorStyle {
    /// Scholar-style byline: `"A Smith, B Jones - Journal, 2019 - host"`.
    Byline,
    /// Every element matching the selector is one author.
    Elements,
}

#[derive(Debug, Clone, Copy)]
pub struct ListingProfile {
    pub source: SourceTag,
    pub base_url: &'static str,
    pub query_param: &'static str,
    pub extra_params: &'static [(&'static str, &'static str)],
    pub paging: Paging,
    pub container: &'static str,
    pub title: &'static str,
    pub link: &'static str,
    pub authors: &'static str,
    pub author_style: AuthorStyle,
    pub year: Option<&'static str>,
    pub journal: Option<&'static str>,
}

pub const GOOGLE_SCHOLAR: ListingProfile = ListingProfile {
    source: SourceTag::GoogleScholar,
    base_url: "https://scholar.google.com/scholar",
    query_param: "q",
    extra_params: &[],
    paging: Paging::Offset { param: "start", step: 10 },
    container: "div.gs_ri",
    title: "h3",
    link: "a",
    authors: "div.gs_a",
    author_style: AuthorStyle::Byline,
    year: None,
    journal: None,
};

pub const SPRINGER: ListingProfile = ListingProfile {
    source: SourceTag::Springer,
    base_url: "https://link.springer.com/search",
    query_param: "query",
    extra_params: &[],
    paging: Paging::Single { limit_param: "show" },
    container: "li.result-item",
    title: "h2",
    link: "a",
    authors: "span.authors",
    author_style: AuthorStyle::Elements,
    year: Some("span.year"),
    journal: Some("span.journal"),
};

pub const HAL: ListingProfile = ListingProfile {
    source: SourceTag::Hal,
    base_url: "https://hal.archives-ouvertes.fr/search/index/",
    query_param: "q",
    extra_params: &[],
    paging: Paging::Single { limit_param: "rows" },
    container: "div.record",
    title: "h2",
    link: "a",
    authors: "span.author",
    author_style: AuthorStyle::Elements,
    year: Some("span.year"),
    journal: Some("span.journal"),
};

pub const RESEARCHGATE: ListingProfile = ListingProfile {
    source: SourceTag::ResearchGate,
    base_url: "https://www.researchgate.net/search",
    query_param: "q",
    extra_params: &[("type", "publication"), ("offset", "0")],
    paging: Paging::Single { limit_param: "limit" },
    container: "div.publication-item",
    title: "h2",
    link: "a",
    authors: "span.author",
    author_style: AuthorStyle::Elements,
    year: Some("span.year"),
    journal: Some("span.journal"),
};

pub const CITESEERX: ListingProfile = ListingProfile {
    source: SourceTag::CiteSeerX,
    base_url: "http://citeseerx.ist.psu.edu/search",
    query_param: "q",
    extra_params: &[("start", "0")],
    paging: Paging::Single { limit_param: "rows" },
    container: "div.result",
    title: "h3",
    link: "a",
    authors: "span.author",
    author_style: AuthorStyle::Elements,
    year: Some("span.year"),
    journal: Some("span.journal"),
};

impl ListingProfile {
    pub fn for_source(tag: SourceTag) -> Option<&'static ListingProfile> {
        match tag {
            SourceTag::GoogleScholar => Some(&GOOGLE_SCHOLAR),
            SourceTag::Springer      => Some(&SPRINGER),
            SourceTag::Hal           => Some(&HAL),
            SourceTag::ResearchGate  => Some(&RESEARCHGATE),
            SourceTag::CiteSeerX     => Some(&CITESEERX),
            _ => None,
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Selector(format!("{css}: {e}")))
}

struct Selectors {
    container: Selector,
    title: Selector,
    link: Selector,
    authors: Selector,
    year: Option<Selector>,
    journal: Option<Selector>,
}

impl Selectors {
    fn compile(profile: &ListingProfile) -> Result<Self> {
        Ok(Self {
            container: selector(profile.container)?,
            title: selector(profile.title)?,
            link: selector(profile.link)?,
            authors: selector(profile.authors)?,
            year: profile.year.map(selector).transpose()?,
            journal: profile.journal.map(selector).transpose()?,
        })
    }
}

const YEAR_PATTERN: &str = r"\b(1[5-9]\d{2}|20\d{2})\b";

pub struct ListingAdapter {
    client: RateLimitedClient,
    profile: &'static ListingProfile,
    selectors: Selectors,
    year_re: Regex,
    base_url: String,
}

impl ListingAdapter {
    /// Fails only if a profile selector does not parse.
    pub fn new(client: RateLimitedClient, profile: &'static ListingProfile) -> Result<Self> {
        Ok(Self {
            client,
            profile,
            selectors: Selectors::compile(profile)?,
            year_re: Regex::new(YEAR_PATTERN).map_err(|e| HarvestError::Config(e.to_string()))?,
            base_url: profile.base_url.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn base_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![(self.profile.query_param, query.to_string())];
        params.extend(self.profile.extra_params.iter().map(|(k, v)| (*k, v.to_string())));
        params
    }

    async fn fetch_page(&self, params: &[(&str, String)]) -> std::result::Result<Vec<ListingItem>, String> {
        let page = self
            .client
            .fetch(&self.base_url, params)
            .await
            .map_err(|e| e.to_string())?;
        Ok(self.parse_page(&page.body))
    }

    /// Every result container on the page, in page order.
    pub fn parse_page(&self, html: &str) -> Vec<ListingItem> {
        let doc = Html::parse_document(html);
        let base = Url::parse(&self.base_url).ok();
        doc.select(&self.selectors.container)
            .map(|el| self.extract(el, base.as_ref()))
            .collect()
    }

    fn extract(&self, el: ElementRef<'_>, base: Option<&Url>) -> ListingItem {
        let s = &self.selectors;
        let first_text = |sel: &Selector| el.select(sel).next().map(element_text).unwrap_or_default();

        let link = el
            .select(&s.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_link(base, href))
            .unwrap_or_default();

        let mut item = ListingItem {
            title: first_text(&s.title),
            link,
            ..ListingItem::default()
        };

        match self.profile.author_style {
            AuthorStyle::Byline => {
                let byline = parse_byline(&first_text(&s.authors), &self.year_re);
                item.authors = byline.authors;
                item.year = byline.year;
                item.journal = byline.journal;
            }
            AuthorStyle::Elements => {
                item.authors = el
                    .select(&s.authors)
                    .map(element_text)
                    .filter(|a| !a.is_empty())
                    .collect();
                item.year = s.year.as_ref().map(|sel| first_text(sel)).unwrap_or_default();
                item.journal = s.journal.as_ref().map(|sel| first_text(sel)).unwrap_or_default();
            }
        }
        item
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>().replace('\u{a0}', " "))
}

fn resolve_link(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(String::from)
        .unwrap_or_else(|| href.to_string())
}

#[derive(Debug, Default, PartialEq)]
struct Byline {
    authors: Vec<String>,
    journal: String,
    year: String,
}

/// Split `"A Smith, B Jones - Nature, 2019 - nature.com"`.
fn parse_byline(text: &str, year_re: &Regex) -> Byline {
    let mut parts = text.split(" - ");
    let authors = parts
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|a| a.trim().trim_end_matches('…').trim())
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect();

    let venue = parts.next().unwrap_or_default().trim();
    let year = year_re
        .find(venue)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let journal = match venue.rsplit_once(',') {
        Some((head, tail)) if year_re.is_match(tail) => head.trim(),
        // venue is the bare year
        _ if venue == year => "",
        _ => venue,
    };

    Byline { authors, journal: journal.to_string(), year }
}

#[async_trait]
impl SourceAdapter for ListingAdapter {
    fn source(&self) -> SourceTag {
        self.profile.source
    }

    #[instrument(skip(self, sink))]
    async fn fetch(&self, query: &str, max_results: usize, sink: &mut dyn BatchSink) {
        let source = self.profile.source;
        match self.profile.paging {
            Paging::Offset { param, step } => {
                let mut collected = 0usize;
                let mut offset = 0usize;
                while offset < max_results && collected < max_results {
                    if sink.should_stop() {
                        break;
                    }
                    let mut params = self.base_params(query);
                    params.push((param, offset.to_string()));
                    offset += step.max(1);

                    let items = match self.fetch_page(&params).await {
                        Ok(items) => items,
                        Err(reason) => {
                            sink.batch_failed(&reason);
                            continue;
                        }
                    };
                    if items.is_empty() {
                        debug!(%source, offset, "Listing page empty, stopping");
                        break;
                    }
                    let batch: Vec<RawItem> = items
                        .into_iter()
                        .take(max_results - collected)
                        .map(|item| RawItem::listing(source, item))
                        .collect();
                    collected += batch.len();
                    sink.accept(batch).await;
                }
            }
            Paging::Single { limit_param } => {
                if sink.should_stop() || max_results == 0 {
                    return;
                }
                let mut params = self.base_params(query);
                params.push((limit_param, max_results.to_string()));

                match self.fetch_page(&params).await {
                    Ok(items) => {
                        debug!(%source, n = items.len(), "Listing page received");
                        let batch = items
                            .into_iter()
                            .take(max_results)
                            .map(|item| RawItem::listing(source, item))
                            .collect();
                        sink.accept(batch).await;
                    }
                    Err(reason) => sink.batch_failed(&reason),
                }
            }
        }
    }

    fn normalise(&self, item: RawItem) -> std::result::Result<CanonicalRecord, NormaliseError> {
        let source = self.profile.source;
        let listing = match item.payload {
            RawPayload::Listing(listing) => listing,
            other => return Err(NormaliseError::WrongPayload { tag: source, kind: other.kind() }),
        };

        let mut record = CanonicalRecord::new(&listing.title, source);
        record.authors = listing.authors;
        record.year = year_from_date(listing.year.trim_matches(|c: char| !c.is_alphanumeric()))?;
        record.journal = listing.journal;
        record.link = listing.link;
        Ok(record)
    }
}
