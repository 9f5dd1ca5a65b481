//! litharvest-ingestion: multi-source bibliographic ingestion.
//!
//! Pipeline stages:
//!   1. Source adapters fetch raw items page by page (arXiv, OpenAlex,
//!      Entrez PubMed/MEDLINE, Scilit, HTML listings)
//!   2. Each raw item is normalised into a `CanonicalRecord`; a bad item is
//!      logged and skipped without touching its siblings
//!   3. The dedup gate drops titles already in the store
//!   4. Surviving records are annotated with named entities
//!   5. Records are upserted by title
//!
//! Every batch goes through stages 2–5 before the adapter issues its next
//! request. Sources run as independent tasks.

pub mod dedup;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod sources;

pub use dedup::DedupGate;
pub use models::{ListingItem, RawItem, RawPayload};
pub use normalise::{NormaliseError, NormalisedBatch};
pub use pipeline::{run_ingestion, IngestionJob, IngestionReport, Interrupt, PipelineContext, SourceReport};
pub use sources::{build_adapter, build_adapters, BatchSink, SourceAdapter};
