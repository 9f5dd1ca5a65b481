//! Named-entity annotation for publication abstracts.
//!
//! The pipeline only sees the [`EntityEnricher`] contract: text in, a
//! `label → {surface forms}` map out. [`GazetteerEnricher`] is the bundled
//! implementation, a dictionary matcher over an Aho-Corasick automaton plus a
//! few pattern rules for organisation and school names.

mod enricher;
mod entity_types;
mod gazetteer;

pub use enricher::{EntityEnricher, NoopEnricher};
pub use entity_types::{normalize_entity_label, EntityLabel};
pub use gazetteer::{ExtractedEntity, GazetteerEnricher, GazetteerStats};

pub type Result<T> = std::result::Result<T, NerError>;

#[derive(Debug, thiserror::Error)]
pub enum NerError {
    #[error("Automaton build failed: {0}")]
    Automaton(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Gazetteer read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid gazetteer line {line}: {reason}")]
    InvalidGazetteer { line: usize, reason: String },
}

impl From<aho_corasick::BuildError> for NerError {
    fn from(e: aho_corasick::BuildError) -> Self {
        NerError::Automaton(e.to_string())
    }
}
