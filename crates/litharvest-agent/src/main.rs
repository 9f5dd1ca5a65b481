//! Litharvest: multi-source bibliographic ingestion.
//! Entry point for the harvester binary.
//!
//! Usage: `litharvest [QUERY]`. The query overrides `ingestion.query` from
//! `litharvest.toml` (or the file named by `LITHARVEST_CONFIG`).

use std::sync::Arc;

use litharvest_common::{Config, HttpSettings, NerConfig};
use litharvest_db::Database;
use litharvest_ingestion::{build_adapters, run_ingestion, IngestionJob, Interrupt, PipelineContext};
use litharvest_ner::{EntityEnricher, GazetteerEnricher, NoopEnricher};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn build_enricher(config: &NerConfig) -> Arc<dyn EntityEnricher> {
    let built = match &config.gazetteer_path {
        Some(path) => GazetteerEnricher::with_gazetteer_file(path),
        None => GazetteerEnricher::with_embedded_lexicon(),
    };
    match built {
        Ok(enricher) => {
            let stats = enricher.stats();
            info!(terms = stats.total_terms, rules = stats.rule_count, "Entity enricher ready");
            Arc::new(enricher)
        }
        Err(e) => {
            warn!("Entity enricher unavailable, records will carry no entities: {e}");
            Arc::new(NoopEnricher)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("litharvest=debug,info")),
        )
        .init();

    info!("Litharvest starting up, version {}", env!("CARGO_PKG_VERSION"));

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not load litharvest.toml: {e}");
            warn!("Falling back to built-in defaults.");
            Config::default()
        }
    };
    if let Some(query) = std::env::args().nth(1) {
        config.ingestion.query = query;
    }
    if config.ingestion.query.trim().is_empty() {
        anyhow::bail!("no query given: pass one as the first argument or set ingestion.query");
    }

    let db = Database::open(&config.database).await?;
    info!(backend = ?config.database.backend, "Record store ready");

    let interrupt = Interrupt::new();
    let _ctrl_c = interrupt.listen_for_ctrl_c();

    let ctx = PipelineContext::new(db.store(), build_enricher(&config.ner)).with_interrupt(interrupt);
    let settings = HttpSettings::from(&config.http);
    let adapters = build_adapters(&config.ingestion, &settings)?;
    let job = IngestionJob::from_config(&config.ingestion);

    let report = run_ingestion(&job, adapters, Arc::new(ctx)).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    db.close().await;
    Ok(())
}
