//! Extracts page-level metadata (description, Open Graph, links) from an
//! HTML main file.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use archivist_core::{ArchiveItem, Enrichment, StageResult};
use archivist_shared::{ArchivistError, Metadata, PluginConfig, Result};

use crate::html;

/// Open Graph properties copied verbatim when present.
const OPEN_GRAPH: &[&str] = &["og:title", "og:description", "og:image", "og:type", "og:site_name"];

pub struct PageMetaEnricher;

impl PageMetaEnricher {
    pub const NAME: &'static str = "page_meta_enricher";

    /// Property the extracted fields are nested under.
    pub const KEY: &'static str = "page_meta";

    pub fn from_config(_config: &PluginConfig) -> Result<Arc<dyn Enrichment>> {
        Ok(Arc::new(Self))
    }

    fn extract(body: &str, base: Option<&Url>) -> Result<Metadata> {
        let doc = Html::parse_document(body);
        let mut fields = Metadata::default();

        if let Some(description) = html::meta_content(&doc, "description")? {
            fields.set("description", description);
        }
        for property in OPEN_GRAPH {
            if let Some(value) = html::meta_content(&doc, property)? {
                fields.set(*property, value);
            }
        }
        if let Some(base) = base {
            let links = html::extract_links(&doc, base)?;
            fields.set("link_count", links.len() as i64);
        }

        Ok(fields)
    }
}

#[async_trait]
impl Enrichment for PageMetaEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn enrich(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Metadata> {
        let mut output = Metadata::new(&item.url);

        let Some(main) = metadata.main_file() else {
            return Ok(output);
        };
        let is_html = html::is_html(main.mime_type())
            || matches!(main.extension().as_str(), ".html" | ".htm");
        let Some(path) = main.local_path().filter(|_| is_html) else {
            tracing::debug!(url = %item.url, "main file is not a local HTML page");
            return Ok(output);
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ArchivistError::io(path, e))?;
        let base = Url::parse(&item.url).ok();
        let fields = Self::extract(&String::from_utf8_lossy(&bytes), base.as_ref())?;

        if !fields.properties().is_empty() {
            output.set(Self::KEY, fields);
        }
        Ok(output)
    }
}
