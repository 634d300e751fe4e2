//! The `ledger_db` database plugin.
//!
//! Dedup rules for a URL already in the ledger:
//! - `success` / `partial`: skip, serving the stored result (unless `reprocess`)
//! - `failed`: process again when `retry_failed`
//! - in progress for less than `stale_after_minutes`: skip
//! - anything else: process

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use archivist_core::{Database, Registry, StageError, StageResult};
use archivist_shared::{ArchiveResult, PluginConfig, Result, Status, expand_home};

use crate::{IN_PROGRESS, Ledger};

/// `[plugins.ledger_db]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub path: String,
    /// Process every URL even when it already succeeded.
    pub reprocess: bool,
    pub retry_failed: bool,
    /// An unfinished run older than this no longer blocks the URL.
    pub stale_after_minutes: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: "~/.archivist/ledger.db".into(),
            reprocess: false,
            retry_failed: true,
            stale_after_minutes: 60,
        }
    }
}

/// Database plugin backed by a [`Ledger`], opened on first use.
pub struct LedgerDatabase {
    settings: LedgerSettings,
    path: PathBuf,
    ledger: OnceCell<Ledger>,
}

impl LedgerDatabase {
    pub const NAME: &'static str = "ledger_db";

    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            path: expand_home(&settings.path),
            settings,
            ledger: OnceCell::new(),
        }
    }

    pub fn from_config(config: &PluginConfig) -> Result<Arc<dyn Database>> {
        Ok(Arc::new(Self::new(config.parse()?)))
    }

    async fn ledger(&self) -> Result<&Ledger> {
        self.ledger
            .get_or_try_init(|| async {
                debug!(path = %self.path.display(), "opening ledger");
                Ledger::open(&self.path).await
            })
            .await
    }
}

/// Register `ledger_db` with the plugin registry.
pub fn register(registry: &mut Registry) {
    registry.register_database(LedgerDatabase::NAME, LedgerDatabase::from_config);
}

#[async_trait]
impl Database for LedgerDatabase {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn should_process(&self, url: &str) -> StageResult<bool> {
        let Some(entry) = self.ledger().await?.entry(url).await? else {
            return Ok(true);
        };

        let process = if entry.status == IN_PROGRESS {
            let stale_after = Duration::minutes(self.settings.stale_after_minutes);
            entry
                .started_at
                .is_none_or(|started| Utc::now() - started >= stale_after)
        } else {
            match entry.completed_status() {
                Some(Status::Success | Status::Partial) => self.settings.reprocess,
                Some(Status::Failed) => self.settings.retry_failed,
                _ => true,
            }
        };
        debug!(url, status = %entry.status, process, "ledger decision");
        Ok(process)
    }

    async fn exists(&self, url: &str) -> StageResult<bool> {
        Ok(self
            .ledger()
            .await?
            .entry(url)
            .await?
            .is_some_and(|entry| entry.result_json.is_some()))
    }

    async fn fetch(&self, url: &str) -> StageResult<ArchiveResult> {
        self.ledger()
            .await?
            .result(url)
            .await?
            .ok_or_else(|| StageError::failed(format!("{}: no stored result for {url}", Self::NAME)))
    }

    async fn started(&self, url: &str) -> StageResult<()> {
        Ok(self.ledger().await?.record_started(url).await?)
    }

    async fn done(&self, result: &ArchiveResult) -> StageResult<()> {
        Ok(self.ledger().await?.record_done(result).await?)
    }
}
