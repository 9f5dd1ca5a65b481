//! The canonical publication record every source is normalised into.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Placeholder title for items whose source gives none.
pub const UNTITLED: &str = "Untitled";

/// Entity category label → distinct surface forms.
pub type EntityMap = BTreeMap<String, BTreeSet<String>>;

/// Which adapter produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Arxiv,
    OpenAlex,
    PubMed,
    Medline,
    Scilit,
    GoogleScholar,
    Springer,
    Hal,
    ResearchGate,
    CiteSeerX,
}

impl SourceTag {
    pub const ALL: [SourceTag; 10] = [
        SourceTag::Arxiv,
        SourceTag::OpenAlex,
        SourceTag::PubMed,
        SourceTag::Medline,
        SourceTag::Scilit,
        SourceTag::GoogleScholar,
        SourceTag::Springer,
        SourceTag::Hal,
        SourceTag::ResearchGate,
        SourceTag::CiteSeerX,
    ];

    /// Stable machine key, matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Arxiv         => "arxiv",
            SourceTag::OpenAlex      => "openalex",
            SourceTag::PubMed        => "pubmed",
            SourceTag::Medline       => "medline",
            SourceTag::Scilit        => "scilit",
            SourceTag::GoogleScholar => "googlescholar",
            SourceTag::Springer      => "springer",
            SourceTag::Hal           => "hal",
            SourceTag::ResearchGate  => "researchgate",
            SourceTag::CiteSeerX     => "citeseerx",
        }
    }

    /// Human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceTag::Arxiv         => "arXiv",
            SourceTag::OpenAlex      => "OpenAlex",
            SourceTag::PubMed        => "PubMed",
            SourceTag::Medline       => "Medline",
            SourceTag::Scilit        => "Scilit",
            SourceTag::GoogleScholar => "Google Scholar",
            SourceTag::Springer      => "Springer",
            SourceTag::Hal           => "HAL",
            SourceTag::ResearchGate  => "ResearchGate",
            SourceTag::CiteSeerX     => "CiteSeerX",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        SourceTag::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| format!("unknown source '{s}'"))
    }
}

/// Unified publication schema all sources are normalised into.
///
/// `title` is the dedup and upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub link: String,
    pub keywords: BTreeSet<String>,
    pub entities: EntityMap,
    pub source: SourceTag,
}

impl CanonicalRecord {
    /// Start a record; a blank title becomes [`UNTITLED`].
    pub fn new(title: &str, source: SourceTag) -> Self {
        Self {
            title: title_or_untitled(title),
            authors: Vec::new(),
            year: None,
            journal: String::new(),
            abstract_text: String::new(),
            link: String::new(),
            keywords: BTreeSet::new(),
            entities: EntityMap::new(),
            source,
        }
    }

    /// Consume the record and return it carrying `entities`.
    pub fn with_entities(self, entities: EntityMap) -> Self {
        Self { entities, ..self }
    }
}

/// Collapse internal whitespace and fall back to [`UNTITLED`].
pub fn title_or_untitled(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        UNTITLED.to_string()
    } else {
        collapsed
    }
}
