//! libSQL archive ledger (offline mode).
//!
//! The [`Ledger`] struct wraps a local libSQL database that remembers which
//! URLs were archived, with what outcome, and which content hashes each run
//! produced. [`LedgerDatabase`] exposes it to the pipeline as the
//! `ledger_db` database plugin.

mod database;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Value, params};
use tokio::sync::Mutex;

use archivist_shared::{ArchiveResult, ArchivistError, Result, Status};

pub use database::{LedgerDatabase, LedgerSettings, register};

/// Status stored for URLs that have started but not completed.
pub const IN_PROGRESS: &str = "in_progress";

/// One row of the `archives` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub url: String,
    /// A [`Status`] string, or [`IN_PROGRESS`].
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_json: Option<String>,
}

impl LedgerEntry {
    /// The completed status, if the row holds one.
    pub fn completed_status(&self) -> Option<Status> {
        self.status.parse().ok()
    }
}

/// One row of the `media_hashes` table.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRecord {
    pub content_hash: String,
    pub url: String,
    /// Storage name to location, as recorded when the URL completed.
    pub storage_locations: serde_json::Map<String, serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Primary ledger handle wrapping a libSQL database.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes multi-statement writes on the shared connection.
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Open or create a ledger at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchivistError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(ledger_err)?;
        let conn = db.connect().map_err(ledger_err)?;

        let ledger = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying ledger migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ArchivistError::Ledger(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // archives
    // -----------------------------------------------------------------------

    /// Mark `url` as in progress, clearing any previous completion time.
    pub async fn record_started(&self, url: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO archives (url, status, started_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(url) DO UPDATE SET
                    status = excluded.status,
                    started_at = excluded.started_at,
                    finished_at = NULL",
                params![url, IN_PROGRESS, now.as_str()],
            )
            .await
            .map_err(ledger_err)?;
        Ok(())
    }

    /// Store the final result of `result.url` and register its media hashes.
    ///
    /// Both writes happen in one transaction.
    pub async fn record_done(&self, result: &ArchiveResult) -> Result<()> {
        let json = result.to_json()?;
        let now = Utc::now().to_rfc3339();

        let _guard = self.write_lock.lock().await;
        let tx = self.conn.transaction().await.map_err(ledger_err)?;

        tx.execute(
            "INSERT INTO archives (url, status, started_at, finished_at, result_json)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                finished_at = excluded.finished_at,
                result_json = excluded.result_json",
            params![result.url.as_str(), result.status.as_str(), now.as_str(), json],
        )
        .await
        .map_err(ledger_err)?;

        for media in result.metadata.media() {
            let locations = serde_json::to_string(media.locations())?;
            tx.execute(
                "INSERT INTO media_hashes (content_hash, url, storage_locations, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(content_hash, url) DO UPDATE SET
                    storage_locations = excluded.storage_locations,
                    recorded_at = excluded.recorded_at",
                params![media.content_hash(), result.url.as_str(), locations, now.as_str()],
            )
            .await
            .map_err(ledger_err)?;
        }

        tx.commit().await.map_err(ledger_err)?;
        tracing::debug!(
            url = %result.url,
            status = %result.status,
            media = result.metadata.media().len(),
            "ledger updated"
        );
        Ok(())
    }

    /// Look up the row for `url`.
    pub async fn entry(&self, url: &str) -> Result<Option<LedgerEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, status, started_at, finished_at, result_json
                 FROM archives WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(ledger_err)?;

        match rows.next().await.map_err(ledger_err)? {
            Some(row) => Ok(Some(LedgerEntry {
                url: row.get::<String>(0).map_err(ledger_err)?,
                status: row.get::<String>(1).map_err(ledger_err)?,
                started_at: optional_text(row.get_value(2).map_err(ledger_err)?)
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?,
                finished_at: optional_text(row.get_value(3).map_err(ledger_err)?)
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?,
                result_json: optional_text(row.get_value(4).map_err(ledger_err)?),
            })),
            None => Ok(None),
        }
    }

    /// The stored result for `url`, if it ever completed.
    pub async fn result(&self, url: &str) -> Result<Option<ArchiveResult>> {
        match self.entry(url).await? {
            Some(LedgerEntry {
                result_json: Some(json),
                ..
            }) => Ok(Some(ArchiveResult::from_json(&json)?)),
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // media_hashes
    // -----------------------------------------------------------------------

    /// Every URL that produced content with `content_hash`, oldest first.
    pub async fn hash_records(&self, content_hash: &str) -> Result<Vec<HashRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT content_hash, url, storage_locations, recorded_at
                 FROM media_hashes WHERE content_hash = ?1
                 ORDER BY recorded_at, url",
                params![content_hash],
            )
            .await
            .map_err(ledger_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(ledger_err)? {
            let locations = row.get::<String>(2).map_err(ledger_err)?;
            records.push(HashRecord {
                content_hash: row.get::<String>(0).map_err(ledger_err)?,
                url: row.get::<String>(1).map_err(ledger_err)?,
                storage_locations: serde_json::from_str(&locations)?,
                recorded_at: parse_timestamp(&row.get::<String>(3).map_err(ledger_err)?)?,
            });
        }
        Ok(records)
    }
}

fn ledger_err(e: libsql::Error) -> ArchivistError {
    ArchivistError::Ledger(e.to_string())
}

fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ArchivistError::Ledger(format!("bad timestamp '{text}': {e}")))
}
