use litharvest_common::EntityMap;

/// Annotates free text with named entities.
///
/// Empty or absent text yields an empty map. Implementations must be pure
/// from the caller's view: same text, same map.
pub trait EntityEnricher: Send + Sync {
    fn annotate(&self, text: &str) -> EntityMap;

    fn annotate_opt(&self, text: Option<&str>) -> EntityMap {
        match text {
            Some(t) => self.annotate(t),
            None => EntityMap::new(),
        }
    }
}

/// Enricher that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

impl EntityEnricher for NoopEnricher {
    fn annotate(&self, _text: &str) -> EntityMap {
        EntityMap::new()
    }
}
