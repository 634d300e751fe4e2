use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Deserialize;

use archivist_core::Feeder;
use archivist_shared::{FeedItem, PluginConfig, Result};

/// `[plugins.list_feeder]` settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListFeederSettings {
    urls: Vec<String>,
    folder: Option<String>,
}

/// Feeds a fixed list of URLs, from config or the command line.
pub struct ListFeeder {
    items: VecDeque<FeedItem>,
}

impl ListFeeder {
    pub const NAME: &'static str = "list_feeder";

    pub fn new<I, S>(urls: I, folder: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items = urls
            .into_iter()
            .filter_map(|u| super::parse_line(u.as_ref()))
            .map(|item| match folder {
                Some(folder) if item.context.folder.is_none() => item.with_folder(folder),
                _ => item,
            })
            .collect();
        Self { items }
    }

    pub fn from_config(config: &PluginConfig) -> Result<Box<dyn Feeder>> {
        let settings: ListFeederSettings = config.parse()?;
        Ok(Box::new(Self::new(&settings.urls, settings.folder.as_deref())))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl Feeder for ListFeeder {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn next(&mut self) -> Result<Option<FeedItem>> {
        Ok(self.items.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_urls_in_order_with_default_folder() {
        let mut feeder = ListFeeder::new(
            ["https://example.com/1", "", "https://example.com/2\tother"],
            Some("batch"),
        );
        assert_eq!(feeder.len(), 2);

        let first = feeder.next().await.unwrap().unwrap();
        assert_eq!(first.url, "https://example.com/1");
        assert_eq!(first.context.folder.as_deref(), Some("batch"));

        let second = feeder.next().await.unwrap().unwrap();
        assert_eq!(second.context.folder.as_deref(), Some("other"));

        assert!(feeder.next().await.unwrap().is_none());
    }
}
