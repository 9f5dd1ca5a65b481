//! Configuration loading for litharvest.
//! Reads litharvest.toml from the current directory or path in LITHARVEST_CONFIG env var.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HarvestError, Result};
use crate::record::SourceTag;


#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ner: NerConfig,
}

// ── [http] ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_delay_min")]
    pub courtesy_delay_min_secs: f64,
    #[serde(default = "default_delay_max")]
    pub courtesy_delay_max_secs: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_delay_min()       -> f64 { 1.0 }
fn default_delay_max()       -> f64 { 3.0 }
fn default_max_attempts()    -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 500 }
fn default_timeout_secs()    -> u64 { 30 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            courtesy_delay_min_secs: default_delay_min(),
            courtesy_delay_max_secs: default_delay_max(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── [ingestion] ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceTag>,
    /// Sent to OpenAlex as `mailto` (polite pool).
    pub contact_email: Option<String>,
    #[serde(default = "default_openalex_page_size")]
    pub openalex_page_size: usize,
    #[serde(default = "default_entrez_batch_size")]
    pub entrez_batch_size: usize,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub entrez_api_key: Option<SecretString>,
    /// Base URL overrides keyed by source tag.
    #[serde(default)]
    pub endpoints: BTreeMap<SourceTag, String>,
}

fn default_max_results()        -> usize { 500 }
fn default_sources()            -> Vec<SourceTag> { SourceTag::ALL.to_vec() }
fn default_openalex_page_size() -> usize { 200 }
fn default_entrez_batch_size()  -> usize { 100 }

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: default_max_results(),
            sources: default_sources(),
            contact_email: None,
            openalex_page_size: default_openalex_page_size(),
            entrez_batch_size: default_entrez_batch_size(),
            entrez_api_key: None,
            endpoints: BTreeMap::new(),
        }
    }
}

impl IngestionConfig {
    /// Configured base URL for `tag`, if overridden.
    pub fn endpoint(&self, tag: SourceTag) -> Option<&str> {
        self.endpoints.get(&tag).map(String::as_str)
    }
}

// ── [database] ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String { "publications".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            table: default_table(),
        }
    }
}

// ── [ner] ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NerConfig {
    /// Extra dictionary terms, one `LABEL<TAB>term` per line.
    pub gazetteer_path: Option<PathBuf>,
}

impl Config {
    /// Load config from file.
    /// Checks LITHARVEST_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var("LITHARVEST_CONFIG")
            .unwrap_or_else(|_| "litharvest.toml".to_string());
        Self::from_path(path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarvestError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ingestion.openalex_page_size == 0 {
            return Err(HarvestError::Config("ingestion.openalex_page_size must be > 0".into()));
        }
        if self.ingestion.entrez_batch_size == 0 {
            return Err(HarvestError::Config("ingestion.entrez_batch_size must be > 0".into()));
        }
        for (key, secs) in [
            ("http.courtesy_delay_min_secs", self.http.courtesy_delay_min_secs),
            ("http.courtesy_delay_max_secs", self.http.courtesy_delay_max_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(HarvestError::Config(format!("{key} must be a finite, non-negative number")));
            }
        }
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(HarvestError::Config("database.url is required for the postgres backend".into()));
        }
        Ok(())
    }
}
