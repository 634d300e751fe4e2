//! Ledger that only reports progress to the log. Never deduplicates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use archivist_core::{Database, StageResult};
use archivist_shared::{ArchiveResult, PluginConfig, Result, Status};

pub struct ConsoleDb;

impl ConsoleDb {
    pub const NAME: &'static str = "console_db";

    pub fn from_config(_config: &PluginConfig) -> Result<Arc<dyn Database>> {
        Ok(Arc::new(Self))
    }
}

#[async_trait]
impl Database for ConsoleDb {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn started(&self, url: &str) -> StageResult<()> {
        info!(url, "archiving started");
        Ok(())
    }

    async fn done(&self, result: &ArchiveResult) -> StageResult<()> {
        let failures = result.failures();
        match result.status {
            Status::Failed | Status::Partial => warn!(
                url = %result.url,
                status = %result.status,
                failures = failures.len(),
                "archiving finished with failures"
            ),
            _ => info!(
                url = %result.url,
                status = %result.status,
                media = result.metadata.media().len(),
                "archiving finished"
            ),
        }
        for (plugin, message) in failures {
            warn!(url = %result.url, %plugin, %message, "plugin failure");
        }
        Ok(())
    }
}
