//! PostgreSQL record store.
//!
//! One row per title. List-valued fields (authors, keywords, entities) are
//! stored as JSONB so a replacing upsert overwrites them wholesale.

use async_trait::async_trait;
use litharvest_common::{CanonicalRecord, EntityMap, SourceTag};
use std::collections::BTreeSet;
use tokio::task::JoinHandle;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::error::{DbError, Result};
use crate::store::{RecordStore, UpsertOutcome};

/// Store backed by a single `tokio-postgres` client.
pub struct PgStore {
    client: Client,
    table: String,
}

impl PgStore {
    /// Connect, spawn the connection driver and make sure the table exists.
    ///
    /// The returned handle completes when the connection closes.
    pub async fn connect(url: &str, table: &str) -> Result<(Self, JoinHandle<()>)> {
        validate_table_name(table)?;

        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        let store = Self { client, table: table.to_string() };
        store.ensure_schema().await?;
        info!(table = %store.table, "PostgreSQL store ready");
        Ok((store, handle))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                title       TEXT PRIMARY KEY,
                authors     JSONB NOT NULL DEFAULT '[]',
                year        INTEGER,
                journal     TEXT NOT NULL DEFAULT '',
                abstract    TEXT NOT NULL DEFAULT '',
                link        TEXT NOT NULL DEFAULT '',
                keywords    JSONB NOT NULL DEFAULT '[]',
                entities    JSONB NOT NULL DEFAULT '{{}}',
                source      TEXT NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table
        );
        self.client.batch_execute(&ddl).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn upsert(&self, record: CanonicalRecord) -> Result<UpsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO {table}
                (title, authors, year, journal, abstract, link, keywords, entities, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (title) DO UPDATE SET
                authors    = EXCLUDED.authors,
                year       = EXCLUDED.year,
                journal    = EXCLUDED.journal,
                abstract   = EXCLUDED.abstract,
                link       = EXCLUDED.link,
                keywords   = EXCLUDED.keywords,
                entities   = EXCLUDED.entities,
                source     = EXCLUDED.source,
                updated_at = now()
            RETURNING (xmax = 0) AS inserted
            "#,
            table = self.table
        );

        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &record.title,
                    &Json(&record.authors),
                    &record.year,
                    &record.journal,
                    &record.abstract_text,
                    &record.link,
                    &Json(&record.keywords),
                    &Json(&record.entities),
                    &record.source.as_str(),
                ],
            )
            .await?;

        let inserted: bool = row.try_get("inserted")?;
        debug!(title = %record.title, inserted, "Upserted record");
        Ok(if inserted { UpsertOutcome::Inserted } else { UpsertOutcome::Replaced })
    }

    async fn exists(&self, title: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE title = $1)", self.table);
        let row = self.client.query_one(&sql, &[&title]).await?;
        Ok(row.try_get(0)?)
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<CanonicalRecord>> {
        let sql = format!(
            "SELECT title, authors, year, journal, abstract, link, keywords, entities, source \
             FROM {} WHERE title = $1",
            self.table
        );
        match self.client.query_opt(&sql, &[&title]).await? {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let row = self.client.query_one(&sql, &[]).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as usize)
    }
}

fn row_to_record(row: &Row) -> Result<CanonicalRecord> {
    let source: String = row.try_get("source")?;
    let source = source.parse::<SourceTag>().map_err(DbError::InvalidRow)?;

    let Json(authors): Json<Vec<String>> = row.try_get("authors")?;
    let Json(keywords): Json<BTreeSet<String>> = row.try_get("keywords")?;
    let Json(entities): Json<EntityMap> = row.try_get("entities")?;

    Ok(CanonicalRecord {
        title: row.try_get("title")?,
        authors,
        year: row.try_get("year")?,
        journal: row.try_get("journal")?,
        abstract_text: row.try_get("abstract")?,
        link: row.try_get("link")?,
        keywords,
        entities,
        source,
    })
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && table.len() <= 63 {
        Ok(())
    } else {
        Err(DbError::InvalidTable(table.to_string()))
    }
}
