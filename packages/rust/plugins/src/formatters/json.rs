//! Machine-readable JSON dump of the metadata record.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use archivist_core::{ArchiveItem, Formatter, StageResult};
use archivist_shared::{Media, Metadata, PluginConfig, Result};

pub struct JsonFormatter;

impl JsonFormatter {
    pub const NAME: &'static str = "json_formatter";

    pub const KEY: &'static str = "json_report";

    pub fn from_config(_config: &PluginConfig) -> Result<Arc<dyn Formatter>> {
        Ok(Arc::new(Self))
    }
}

#[async_trait]
impl Formatter for JsonFormatter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn format(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Media> {
        let content = metadata.to_json()?;
        super::write_artifact(
            &item.scratch_dir,
            format!("metadata-{}.json", Uuid::now_v7()),
            &content,
            Self::KEY,
        )
        .await
    }
}
