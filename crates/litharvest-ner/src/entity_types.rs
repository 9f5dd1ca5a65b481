//! Entity label taxonomy and normalization.

use std::collections::HashMap;

/// Normalized entity label attached to abstracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum EntityLabel {
    Person,
    Organization,
    Location,
    /// Nationalities, religious and political groups.
    Nationality,
    Product,
    School,
    Other,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Person       => "PERSON",
            EntityLabel::Organization => "ORG",
            EntityLabel::Location     => "LOC",
            EntityLabel::Nationality  => "NORP",
            EntityLabel::Product      => "PRODUCT",
            EntityLabel::School       => "SCHOOL",
            EntityLabel::Other        => "OTHER",
        }
    }
}

// Map model-specific labels to normalized labels
fn get_label_map() -> &'static HashMap<&'static str, EntityLabel> {
    use std::sync::OnceLock;
    static LABEL_MAP: OnceLock<HashMap<&'static str, EntityLabel>> = OnceLock::new();
    LABEL_MAP.get_or_init(|| {
        let mut m = HashMap::new();

        // OntoNotes (spaCy) labels
        m.insert("PERSON", EntityLabel::Person);
        m.insert("ORG", EntityLabel::Organization);
        m.insert("GPE", EntityLabel::Location);
        m.insert("LOC", EntityLabel::Location);
        m.insert("FAC", EntityLabel::Location);
        m.insert("NORP", EntityLabel::Nationality);
        m.insert("PRODUCT", EntityLabel::Product);
        m.insert("WORK_OF_ART", EntityLabel::Other);
        m.insert("EVENT", EntityLabel::Other);

        // CoNLL labels
        m.insert("PER", EntityLabel::Person);
        m.insert("ORGANIZATION", EntityLabel::Organization);
        m.insert("LOCATION", EntityLabel::Location);
        m.insert("MISC", EntityLabel::Other);

        // Our own
        m.insert("SCHOOL", EntityLabel::School);
        m.insert("OTHER", EntityLabel::Other);

        m
    })
}

/// Normalize a model-specific entity label to an [`EntityLabel`].
pub fn normalize_entity_label(label: &str) -> EntityLabel {
    // BIO tagging prefixes
    let upper = label.trim().to_ascii_uppercase();
    let clean = upper.trim_start_matches("B-").trim_start_matches("I-");

    get_label_map()
        .get(clean)
        .copied()
        .unwrap_or(EntityLabel::Other)
}
