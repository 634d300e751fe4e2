use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use archivist_core::Feeder;
use archivist_shared::{ArchivistError, FeedItem, PluginConfig, Result, expand_home};

/// Reads `url[<TAB>folder]` lines from a text file, one at a time.
pub struct FileFeeder {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
}

impl FileFeeder {
    pub const NAME: &'static str = "file_feeder";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
        }
    }

    pub fn from_config(config: &PluginConfig) -> Result<Box<dyn Feeder>> {
        let path = config
            .get_str("path")
            .ok_or_else(|| ArchivistError::fatal("[plugins.file_feeder] requires `path`"))?;
        Ok(Box::new(Self::new(expand_home(path))))
    }
}

#[async_trait]
impl Feeder for FileFeeder {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn next(&mut self) -> Result<Option<FeedItem>> {
        if self.lines.is_none() {
            let file = File::open(&self.path)
                .await
                .map_err(|e| ArchivistError::io(&self.path, e))?;
            tracing::debug!(path = %self.path.display(), "reading feed file");
            self.lines = Some(BufReader::new(file).lines());
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ArchivistError::io(&self.path, e))?
        {
            if let Some(item) = super::parse_line(&line) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}
