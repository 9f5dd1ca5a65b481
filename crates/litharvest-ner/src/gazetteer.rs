//! Dictionary NER using an Aho-Corasick automaton.
//!
//! Terms come from a small embedded lexicon plus an optional gazetteer file
//! (`LABEL<TAB>term` per line, `#` comments). Matches are case-sensitive and
//! must sit on word boundaries. A handful of regex rules catch institution
//! names ("University of X", "Collège de Y") the lexicon cannot enumerate.
//! Overlapping hits resolve to the leftmost, then longest.

use aho_corasick::{AhoCorasick, MatchKind};
use litharvest_common::EntityMap;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::enricher::EntityEnricher;
use crate::entity_types::{normalize_entity_label, EntityLabel};
use crate::{NerError, Result};

/// An entity found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    pub text: String,
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GazetteerStats {
    pub total_terms: usize,
    pub rule_count: usize,
    /// Term count per label key (`"ORG"`, `"LOC"`, ...).
    pub per_label: BTreeMap<&'static str, usize>,
}

/// Dictionary-plus-rules entity enricher.
pub struct GazetteerEnricher {
    automaton: AhoCorasick,
    /// Pattern index -> label
    pattern_labels: Vec<EntityLabel>,
    rules: Vec<(EntityLabel, Regex)>,
    stats: GazetteerStats,
}

impl GazetteerEnricher {
    /// Embedded lexicon only.
    pub fn with_embedded_lexicon() -> Result<Self> {
        Self::from_terms(embedded_terms())
    }

    /// Embedded lexicon plus every term in the gazetteer file at `path`.
    pub fn with_gazetteer_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let extra = parse_gazetteer(&content)?;
        info!(path = %path.as_ref().display(), terms = extra.len(), "Loaded gazetteer file");
        Self::from_terms(embedded_terms().chain(extra))
    }

    /// Build from explicit `(label, term)` pairs. Blank terms are dropped and
    /// a repeated term keeps its first label.
    pub fn from_terms<I>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (EntityLabel, String)>,
    {
        let mut seen = HashSet::new();
        let mut patterns: Vec<String> = Vec::new();
        let mut pattern_labels: Vec<EntityLabel> = Vec::new();

        for (label, term) in terms {
            let term = term.trim().to_string();
            if term.is_empty() || !seen.insert(term.clone()) {
                continue;
            }
            patterns.push(term);
            pattern_labels.push(label);
        }

        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)?;

        let rules = RULES
            .iter()
            .map(|(label, pattern)| Ok((*label, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut per_label = BTreeMap::new();
        for label in &pattern_labels {
            *per_label.entry(label.as_str()).or_insert(0) += 1;
        }
        let stats = GazetteerStats {
            total_terms: patterns.len(),
            rule_count: rules.len(),
            per_label,
        };

        info!(terms = stats.total_terms, rules = stats.rule_count, "GazetteerEnricher ready");

        Ok(Self { automaton, pattern_labels, rules, stats })
    }

    pub fn stats(&self) -> &GazetteerStats {
        &self.stats
    }

    /// All non-overlapping entities in `text`, in text order.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut entities = Vec::new();

        for mat in self.automaton.find_iter(text) {
            if !on_word_boundary(text, mat.start(), mat.end()) {
                continue;
            }
            entities.push(ExtractedEntity {
                text: text[mat.start()..mat.end()].to_string(),
                label: self.pattern_labels[mat.pattern().as_usize()],
                start: mat.start(),
                end: mat.end(),
            });
        }

        for (label, rule) in &self.rules {
            for mat in rule.find_iter(text) {
                let surface = mat.as_str().trim_end();
                entities.push(ExtractedEntity {
                    text: surface.to_string(),
                    label: *label,
                    start: mat.start(),
                    end: mat.start() + surface.len(),
                });
            }
        }

        remove_overlapping(entities)
    }
}

impl EntityEnricher for GazetteerEnricher {
    fn annotate(&self, text: &str) -> EntityMap {
        let mut map = EntityMap::new();
        if text.trim().is_empty() {
            return map;
        }
        for entity in self.extract(text) {
            map.entry(entity.label.as_str().to_string())
                .or_default()
                .insert(entity.text);
        }
        debug!(labels = map.len(), "Annotated text");
        map
    }
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
}

fn remove_overlapping(mut entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    if entities.is_empty() {
        return entities;
    }

    // Sort by start position, then by length (longest first)
    entities.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
    });

    let mut result = Vec::new();
    let mut last_end = 0;
    for entity in entities {
        if entity.start >= last_end {
            last_end = entity.end;
            result.push(entity);
        }
    }
    result
}

/// Parse `LABEL<TAB>term` lines. Labels go through [`normalize_entity_label`].
fn parse_gazetteer(content: &str) -> Result<Vec<(EntityLabel, String)>> {
    let mut terms = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let (label, term) = line.split_once('\t').ok_or_else(|| NerError::InvalidGazetteer {
            line: idx + 1,
            reason: "expected LABEL<TAB>term".to_string(),
        })?;
        if term.trim().is_empty() {
            return Err(NerError::InvalidGazetteer {
                line: idx + 1,
                reason: "empty term".to_string(),
            });
        }
        terms.push((normalize_entity_label(label), term.trim().to_string()));
    }
    Ok(terms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedded data

const RULES: &[(EntityLabel, &str)] = &[
    (
        EntityLabel::Organization,
        r"\b(?:University|Institute|Laboratory|Academy|Centre|Center) (?:of|for) (?:the )?[A-Z][\p{L}\-]+(?: [A-Z][\p{L}\-]+)*",
    ),
    (
        EntityLabel::Organization,
        r"\b(?:[A-Z][\p{L}\-]+ )+(?:University|Institute|Laboratory|Corporation)\b",
    ),
    (
        EntityLabel::School,
        r"(?:\b|^)(?:[ÉE]cole|Coll[èe]ge|School)(?:\s+(?:de la|de l'|des|du|de|d'|of the|of))?\s*[A-ZÉ][\p{L}\-]+(?: [A-ZÉ][\p{L}\-]+)*",
    ),
    (
        EntityLabel::Person,
        r"\b(?:Dr|Prof|Professor)\.? [A-Z][\p{Ll}\-]+(?: [A-Z][\p{Ll}\-]+)?",
    ),
];

const EMBEDDED_LEXICON: &[(EntityLabel, &str)] = &[
    // Places
    (EntityLabel::Location, "France"),
    (EntityLabel::Location, "Germany"),
    (EntityLabel::Location, "United States"),
    (EntityLabel::Location, "United Kingdom"),
    (EntityLabel::Location, "China"),
    (EntityLabel::Location, "Japan"),
    (EntityLabel::Location, "India"),
    (EntityLabel::Location, "Brazil"),
    (EntityLabel::Location, "Canada"),
    (EntityLabel::Location, "Italy"),
    (EntityLabel::Location, "Spain"),
    (EntityLabel::Location, "Morocco"),
    (EntityLabel::Location, "Europe"),
    (EntityLabel::Location, "Africa"),
    (EntityLabel::Location, "Asia"),
    (EntityLabel::Location, "Paris"),
    (EntityLabel::Location, "London"),
    (EntityLabel::Location, "Berlin"),
    (EntityLabel::Location, "Beijing"),
    (EntityLabel::Location, "Tokyo"),
    (EntityLabel::Location, "New York"),
    (EntityLabel::Location, "California"),
    // Nationalities and groups
    (EntityLabel::Nationality, "French"),
    (EntityLabel::Nationality, "German"),
    (EntityLabel::Nationality, "American"),
    (EntityLabel::Nationality, "British"),
    (EntityLabel::Nationality, "Chinese"),
    (EntityLabel::Nationality, "Japanese"),
    (EntityLabel::Nationality, "Indian"),
    (EntityLabel::Nationality, "European"),
    (EntityLabel::Nationality, "African"),
    (EntityLabel::Nationality, "Moroccan"),
    (EntityLabel::Nationality, "Italian"),
    (EntityLabel::Nationality, "Spanish"),
    (EntityLabel::Nationality, "Canadian"),
    // Organizations
    (EntityLabel::Organization, "NASA"),
    (EntityLabel::Organization, "CNRS"),
    (EntityLabel::Organization, "INSERM"),
    (EntityLabel::Organization, "CERN"),
    (EntityLabel::Organization, "UNESCO"),
    (EntityLabel::Organization, "World Health Organization"),
    (EntityLabel::Organization, "European Commission"),
    (EntityLabel::Organization, "National Institutes of Health"),
    (EntityLabel::Organization, "Max Planck Society"),
    (EntityLabel::Organization, "Google"),
    (EntityLabel::Organization, "Microsoft"),
    (EntityLabel::Organization, "IBM"),
    (EntityLabel::Organization, "MIT"),
    // Products
    (EntityLabel::Product, "TensorFlow"),
    (EntityLabel::Product, "PyTorch"),
    (EntityLabel::Product, "MATLAB"),
    (EntityLabel::Product, "scikit-learn"),
    (EntityLabel::Product, "AlphaFold"),
    (EntityLabel::Product, "Hubble Space Telescope"),
    // Schools
    (EntityLabel::School, "École polytechnique"),
    (EntityLabel::School, "École normale supérieure"),
    (EntityLabel::School, "Sorbonne"),
    (EntityLabel::School, "Harvard Medical School"),
];

fn embedded_terms() -> impl Iterator<Item = (EntityLabel, String)> {
    EMBEDDED_LEXICON.iter().map(|(label, term)| (*label, term.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::io::Write;

    fn enricher() -> GazetteerEnricher {
        GazetteerEnricher::with_embedded_lexicon().unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_and_absent_text_give_empty_map() {
        let ner = enricher();
        assert!(ner.annotate("").is_empty());
        assert!(ner.annotate("   \n").is_empty());
        assert!(ner.annotate_opt(None).is_empty());
    }

    #[test]
    fn test_annotates_dictionary_terms_by_label() {
        let ner = enricher();
        let map = ner.annotate("French and German teams at CNRS trained PyTorch models in Paris and Berlin.");
        assert_eq!(map["NORP"], set(&["French", "German"]));
        assert_eq!(map["ORG"], set(&["CNRS"]));
        assert_eq!(map["PRODUCT"], set(&["PyTorch"]));
        assert_eq!(map["LOC"], set(&["Berlin", "Paris"]));
    }

    #[test]
    fn test_repeated_mentions_collapse() {
        let map = enricher().annotate("France, France and again France.");
        assert_eq!(map["LOC"], set(&["France"]));
    }

    #[test]
    fn test_partial_words_ignored() {
        let map = enricher().annotate("Francesco wrote about Germanic dialects.");
        assert!(map.get("LOC").is_none());
        assert!(map.get("NORP").is_none());
    }

    #[test]
    fn test_rules_find_institutions() {
        let map = enricher().annotate(
            "Work done at the University of Oxford with Prof. Smith and the Collège de France.",
        );
        assert_eq!(map["ORG"], set(&["University of Oxford"]));
        assert_eq!(map["PERSON"], set(&["Prof. Smith"]));
        // The longer school name wins over the nested country.
        assert_eq!(map["SCHOOL"], set(&["Collège de France"]));
        assert!(map.get("LOC").is_none());
    }

    #[test]
    fn test_overlap_keeps_longest() {
        let entities = remove_overlapping(vec![
            ExtractedEntity { text: "New".into(), label: EntityLabel::Other, start: 0, end: 3 },
            ExtractedEntity { text: "New York".into(), label: EntityLabel::Location, start: 0, end: 8 },
            ExtractedEntity { text: "York".into(), label: EntityLabel::Other, start: 4, end: 8 },
        ]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "New York");
    }

    #[test]
    fn test_gazetteer_file_adds_terms() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# extra terms").unwrap();
        writeln!(file, "GPE\tRabat").unwrap();
        writeln!(file, "ORG\tInstitut Pasteur").unwrap();
        writeln!(file).unwrap();

        let ner = GazetteerEnricher::with_gazetteer_file(file.path()).unwrap();
        let map = ner.annotate("Samples from Rabat were sequenced at Institut Pasteur.");
        assert_eq!(map["LOC"], set(&["Rabat"]));
        assert_eq!(map["ORG"], set(&["Institut Pasteur"]));
        assert_eq!(ner.stats().total_terms, EMBEDDED_LEXICON.len() + 2);
    }

    #[test]
    fn test_malformed_gazetteer_line_rejected() {
        let err = parse_gazetteer("ORG\tCERN\nno tab here\n").unwrap_err();
        assert!(matches!(err, NerError::InvalidGazetteer { line: 2, .. }));
    }

    #[test]
    fn test_stats_count_terms_per_label() {
        let ner = GazetteerEnricher::from_terms(vec![
            (EntityLabel::Location, "Lyon".to_string()),
            (EntityLabel::Location, "Lyon".to_string()),
            (EntityLabel::Product, "Rust".to_string()),
            (EntityLabel::Other, "  ".to_string()),
        ])
        .unwrap();
        assert_eq!(ner.stats().total_terms, 2);
        assert_eq!(ner.stats().per_label.get("LOC"), Some(&1));
        assert_eq!(ner.stats().rule_count, RULES.len());
    }
}
