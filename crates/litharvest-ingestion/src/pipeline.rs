//! End-to-end ingestion run.
//!
//! Orchestrates one query across every configured source:
//!   1. Spawn one task per source adapter (each owns its request client)
//!   2. For every batch the adapter delivers: normalise → dedup gate →
//!      enrich → upsert, before the adapter makes its next request
//!   3. Collect per-source counts into an `IngestionReport`
//!
//! The run is non-destructive: failures are logged and counted, never
//! propagated. An interrupt stops every source at its next step boundary;
//! whatever was persisted stays persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use litharvest_common::{IngestionConfig, SourceTag};
use litharvest_db::RecordStore;
use litharvest_ner::EntityEnricher;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::dedup::DedupGate;
use crate::models::RawItem;
use crate::normalise::normalise_batch;
use crate::sources::{BatchSink, SourceAdapter};

// ── Job config ────────────────────────────────────────────────────────────────

/// Parameters for a single ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub query: String,
    pub max_results: usize,
}

impl IngestionJob {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self { query: query.into(), max_results }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.query.clone(), config.max_results)
    }
}

// ── Interrupt ────────────────────────────────────────────────────────────────

/// Shared stop flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trigger on the first Ctrl-C.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Interrupt received, stopping at the next step");
                    flag.trigger();
                }
                Err(e) => error!(error = %e, "Could not listen for Ctrl-C"),
            }
        })
    }
}

// ── Shared handles ────────────────────────────────────────────────────────────

/// Everything the per-source tasks share.
pub struct PipelineContext {
    pub store: Arc<dyn RecordStore>,
    pub gate: DedupGate,
    pub enricher: Arc<dyn EntityEnricher>,
    pub interrupt: Interrupt,
}

impl PipelineContext {
    pub fn new(store: Arc<dyn RecordStore>, enricher: Arc<dyn EntityEnricher>) -> Self {
        Self {
            gate: DedupGate::new(Arc::clone(&store)),
            store,
            enricher,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: Option<SourceTag>,
    pub items_fetched: usize,
    pub parse_failures: usize,
    pub duplicates_skipped: usize,
    pub records_persisted: usize,
    pub persist_failures: usize,
    /// Pages/batches whose request or payload failed.
    pub failed_batches: usize,
}

impl SourceReport {
    pub fn new(source: SourceTag) -> Self {
        Self { source: Some(source), ..Self::default() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub interrupted: bool,
    pub sources: Vec<SourceReport>,
}

impl IngestionReport {
    pub fn source(&self, tag: SourceTag) -> Option<&SourceReport> {
        self.sources.iter().find(|r| r.source == Some(tag))
    }

    pub fn total_persisted(&self) -> usize {
        self.sources.iter().map(|r| r.records_persisted).sum()
    }

    pub fn total_fetched(&self) -> usize {
        self.sources.iter().map(|r| r.items_fetched).sum()
    }
}

// ── Per-source stage ──────────────────────────────────────────────────────────

/// Normalise → gate → enrich → persist, one batch at a time.
struct StageSink<'a> {
    adapter: &'a dyn SourceAdapter,
    ctx: &'a PipelineContext,
    report: SourceReport,
}

#[async_trait]
impl BatchSink for StageSink<'_> {
    async fn accept(&mut self, items: Vec<RawItem>) {
        let source = self.adapter.source();
        if self.ctx.interrupt.is_triggered() {
            debug!(%source, dropped = items.len(), "Interrupted, batch not processed");
            return;
        }

        self.report.items_fetched += items.len();
        let batch = normalise_batch(self.adapter, items);
        self.report.parse_failures += batch.failures;

        for record in batch.records {
            if self.ctx.interrupt.is_triggered() {
                break;
            }
            if self.ctx.gate.exists(&record.title).await {
                debug!(%source, title = %record.title, "Already stored, skipping");
                self.report.duplicates_skipped += 1;
                continue;
            }

            let entities = self.ctx.enricher.annotate(&record.abstract_text);
            let record = record.with_entities(entities);
            let title = record.title.clone();

            match self.ctx.store.upsert(record).await {
                Ok(outcome) => {
                    debug!(%source, title = %title, ?outcome, "Record persisted");
                    self.report.records_persisted += 1;
                }
                Err(e) => {
                    error!(%source, title = %title, error = %e, "Persist failed, abandoning rest of batch");
                    self.report.persist_failures += 1;
                    break;
                }
            }
        }
    }

    fn batch_failed(&mut self, reason: &str) {
        debug!(source = %self.adapter.source(), reason, "Batch contributed nothing");
        self.report.failed_batches += 1;
    }

    fn should_stop(&self) -> bool {
        self.ctx.interrupt.is_triggered()
    }
}

/// Run one adapter through the stage and return its counts.
pub async fn run_source(
    adapter: &dyn SourceAdapter,
    job: &IngestionJob,
    ctx: &PipelineContext,
) -> SourceReport {
    let source = adapter.source();
    info!(%source, "Source started");

    let mut sink = StageSink { adapter, ctx, report: SourceReport::new(source) };
    adapter.fetch(&job.query, job.max_results, &mut sink).await;
    let report = sink.report;

    info!(
        %source,
        fetched = report.items_fetched,
        persisted = report.records_persisted,
        duplicates = report.duplicates_skipped,
        parse_failures = report.parse_failures,
        persist_failures = report.persist_failures,
        failed_batches = report.failed_batches,
        "Source finished"
    );
    report
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

/// Runs every adapter concurrently and reports per-source counts.
///
/// Sources never block each other; a source task that panics is logged and
/// reported with zero counts.
#[instrument(skip(job, adapters, ctx), fields(query = %job.query))]
pub async fn run_ingestion(
    job: &IngestionJob,
    adapters: Vec<Box<dyn SourceAdapter>>,
    ctx: Arc<PipelineContext>,
) -> IngestionReport {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let start = Instant::now();

    info!(run_id = %run_id, sources = adapters.len(), max_results = job.max_results, "Starting ingestion run");

    let (tags, handles): (Vec<SourceTag>, Vec<JoinHandle<SourceReport>>) = adapters
        .into_iter()
        .map(|adapter| {
            let tag = adapter.source();
            let job = job.clone();
            let ctx = Arc::clone(&ctx);
            let handle = tokio::spawn(async move { run_source(adapter.as_ref(), &job, &ctx).await });
            (tag, handle)
        })
        .unzip();

    let sources: Vec<SourceReport> = join_all(handles)
        .await
        .into_iter()
        .zip(tags)
        .map(|(joined, tag)| {
            joined.unwrap_or_else(|e| {
                error!(source = %tag, error = %e, "Source task failed");
                SourceReport::new(tag)
            })
        })
        .collect();

    let report = IngestionReport {
        run_id,
        query: job.query.clone(),
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        interrupted: ctx.interrupt.is_triggered(),
        sources,
    };

    info!(
        run_id = %report.run_id,
        fetched = report.total_fetched(),
        persisted = report.total_persisted(),
        interrupted = report.interrupted,
        duration_ms = report.duration_ms,
        "Ingestion run complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use litharvest_common::CanonicalRecord;
    use litharvest_db::{DbError, MemoryStore, UpsertOutcome};
    use litharvest_ner::NoopEnricher;
    use crate::normalise::NormaliseError;
    use crate::models::RawPayload;

    /// Delivers fixed JSON batches without touching the network.
    struct StaticAdapter {
        batches: Vec<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn source(&self) -> SourceTag {
            SourceTag::Scilit
        }

        async fn fetch(&self, _query: &str, _max: usize, sink: &mut dyn BatchSink) {
            for batch in &self.batches {
                if sink.should_stop() {
                    return;
                }
                let items = batch.iter().cloned().map(|v| RawItem::json(SourceTag::Scilit, v)).collect();
                sink.accept(items).await;
            }
        }

        fn normalise(&self, item: RawItem) -> Result<CanonicalRecord, NormaliseError> {
            match item.payload {
                RawPayload::Json(v) => match v["title"].as_str() {
                    Some(t) => Ok(CanonicalRecord::new(t, SourceTag::Scilit)),
                    None => Err(NormaliseError::UnexpectedShape { field: "title", detail: v.to_string() }),
                },
                other => Err(NormaliseError::WrongPayload { tag: SourceTag::Scilit, kind: other.kind() }),
            }
        }
    }

    /// Memory store that refuses to write one title.
    struct FlakyStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn upsert(&self, record: CanonicalRecord) -> litharvest_db::Result<UpsertOutcome> {
            if record.title == self.reject {
                return Err(DbError::InvalidRow(format!("rejected {}", record.title)));
            }
            self.inner.upsert(record).await
        }

        async fn exists(&self, title: &str) -> litharvest_db::Result<bool> {
            self.inner.exists(title).await
        }

        async fn find_by_title(&self, title: &str) -> litharvest_db::Result<Option<CanonicalRecord>> {
            self.inner.find_by_title(title).await
        }

        async fn count(&self) -> litharvest_db::Result<usize> {
            self.inner.count().await
        }
    }

    fn ctx() -> (Arc<MemoryStore>, Arc<PipelineContext>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = PipelineContext::new(store.clone(), Arc::new(NoopEnricher));
        (store, Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_counts_per_source() {
        let (store, ctx) = ctx();
        let adapter = StaticAdapter {
            batches: vec![
                vec![serde_json::json!({"title": "A"}), serde_json::json!({"title": 5})],
                vec![serde_json::json!({"title": "A"}), serde_json::json!({"title": "B"})],
            ],
        };
        let report = run_ingestion(&IngestionJob::new("q", 10), vec![Box::new(adapter)], ctx).await;

        let src = report.source(SourceTag::Scilit).unwrap();
        assert_eq!(src.items_fetched, 4);
        assert_eq!(src.parse_failures, 1);
        assert_eq!(src.duplicates_skipped, 1);
        assert_eq!(src.records_persisted, 2);
        assert!(!report.interrupted);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persist_failure_abandons_rest_of_batch_only() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new(), reject: "B" });
        let ctx = Arc::new(PipelineContext::new(store.clone(), Arc::new(NoopEnricher)));
        let adapter = StaticAdapter {
            batches: vec![
                vec![
                    serde_json::json!({"title": "A"}),
                    serde_json::json!({"title": "B"}),
                    serde_json::json!({"title": "C"}),
                ],
                vec![serde_json::json!({"title": "D"})],
            ],
        };
        let report = run_ingestion(&IngestionJob::new("q", 10), vec![Box::new(adapter)], ctx).await;

        let src = report.source(SourceTag::Scilit).unwrap();
        assert_eq!(src.items_fetched, 4);
        assert_eq!(src.persist_failures, 1);
        assert_eq!(src.records_persisted, 2);
        assert!(store.exists("A").await.unwrap());
        assert!(!store.exists("C").await.unwrap());
        assert!(store.exists("D").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_before_run_persists_nothing() {
        let (store, ctx) = ctx();
        ctx.interrupt.trigger();
        let adapter = StaticAdapter { batches: vec![vec![serde_json::json!({"title": "A"})]] };
        let report = run_ingestion(&IngestionJob::new("q", 10), vec![Box::new(adapter)], ctx).await;

        assert!(report.interrupted);
        assert_eq!(report.total_persisted(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn test_job_from_config() {
        let config = IngestionConfig { query: "peat".into(), max_results: 42, ..Default::default() };
        let job = IngestionJob::from_config(&config);
        assert_eq!(job.query, "peat");
        assert_eq!(job.max_results, 42);
    }
}
