//! Forensic content hashes of every captured file.
//!
//! A media's content hash is fixed when it is created. This enrichment
//! re-reads each file to verify it still matches, then publishes the
//! recorded hashes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use archivist_core::{ArchiveItem, Enrichment, StageError, StageResult};
use archivist_shared::{Media, Metadata, PluginConfig, Result, hash_file};

pub struct HashEnricher;

impl HashEnricher {
    pub const NAME: &'static str = "hash_enricher";

    /// Nested map of media position → `{file, sha256}`.
    pub const KEY: &'static str = "hashes";

    pub fn from_config(_config: &PluginConfig) -> Result<Arc<dyn Enrichment>> {
        Ok(Arc::new(Self))
    }
}

/// Check the file behind `media` against its recorded hash, off the async runtime.
async fn verify(media: &Media) -> StageResult<()> {
    let Some(path) = media.local_path().map(|p| p.to_path_buf()) else {
        return Ok(());
    };
    let actual = tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| StageError::failed(format!("hash task aborted: {e}")))??;
    if actual != media.content_hash() {
        let file = media.file_name().unwrap_or_default();
        warn!(%file, recorded = media.content_hash(), %actual, "file content differs from recorded hash");
        return Err(StageError::failed(format!(
            "{file} changed after capture: recorded {}, found {actual}",
            media.content_hash()
        )));
    }
    Ok(())
}

#[async_trait]
impl Enrichment for HashEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn enrich(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Metadata> {
        let mut output = Metadata::new(&item.url);
        let mut hashes = Metadata::default();

        for (index, media) in metadata.media().iter().enumerate() {
            verify(media).await?;
            let hash = format!("sha256:{}", media.content_hash());
            if metadata.main_file().is_some_and(|m| m.content_hash() == media.content_hash()) {
                output.set_hash(hash.clone());
            }
            let mut entry = Metadata::default().with("sha256", hash);
            if let Some(file) = media.file_name() {
                entry.set("file", file);
            }
            hashes.set(index.to_string(), entry);
        }

        if !hashes.properties().is_empty() {
            output.set(Self::KEY, hashes);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_shared::{FeedContext, hash_bytes, keys};
    use uuid::Uuid;

    fn scratch() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("archivist-hash-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn entry<'a>(output: &'a Metadata, index: &str) -> &'a Metadata {
        output
            .get(HashEnricher::KEY)
            .unwrap()
            .as_nested()
            .unwrap()
            .get(index)
            .unwrap()
            .as_nested()
            .unwrap()
    }

    #[tokio::test]
    async fn hashes_main_file_and_every_media() {
        let dir = scratch();
        let video = dir.join("video.mp4");
        let thumb = dir.join("thumb.jpg");
        std::fs::write(&video, b"video bytes").unwrap();
        std::fs::write(&thumb, b"thumb bytes").unwrap();

        let mut metadata = Metadata::new("https://example.com/v");
        metadata.set_main_file(Media::new(&video, hash_bytes(b"video bytes")));
        metadata.add_media(Media::new(&thumb, hash_bytes(b"thumb bytes")).with_key(keys::THUMBNAIL));
        let item = ArchiveItem::new("https://example.com/v", FeedContext::default(), dir.clone());

        let output = HashEnricher.enrich(&metadata, &item).await.unwrap();

        let expected = format!("sha256:{}", hash_bytes(b"video bytes"));
        assert_eq!(output.hash(), Some(expected.as_str()));
        let thumb_entry = entry(&output, "1");
        assert_eq!(thumb_entry.get("file").unwrap().as_str(), Some("thumb.jpg"));
        assert_eq!(
            thumb_entry.get("sha256").unwrap().as_str(),
            Some(format!("sha256:{}", hash_bytes(b"thumb bytes")).as_str())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn same_file_names_keep_separate_entries() {
        let dir = scratch();
        std::fs::create_dir_all(dir.join("a")).unwrap();
        std::fs::create_dir_all(dir.join("b")).unwrap();
        std::fs::write(dir.join("a/image.jpg"), b"first").unwrap();
        std::fs::write(dir.join("b/image.jpg"), b"second").unwrap();

        let metadata = Metadata::new("https://example.com/g")
            .with_media(Media::new(dir.join("a/image.jpg"), hash_bytes(b"first")))
            .with_media(Media::new(dir.join("b/image.jpg"), hash_bytes(b"second")));
        let item = ArchiveItem::new("https://example.com/g", FeedContext::default(), dir.clone());

        let output = HashEnricher.enrich(&metadata, &item).await.unwrap();

        let first = entry(&output, "0").get("sha256").unwrap().as_str().unwrap().to_string();
        let second = entry(&output, "1").get("sha256").unwrap().as_str().unwrap().to_string();
        assert_eq!(first, format!("sha256:{}", hash_bytes(b"first")));
        assert_eq!(second, format!("sha256:{}", hash_bytes(b"second")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn modified_file_fails_verification() {
        let dir = scratch();
        let video = dir.join("video.mp4");
        std::fs::write(&video, b"tampered").unwrap();

        let mut metadata = Metadata::new("https://example.com/v");
        metadata.set_main_file(Media::new(&video, hash_bytes(b"original")));
        let item = ArchiveItem::new("https://example.com/v", FeedContext::default(), dir.clone());

        let err = HashEnricher.enrich(&metadata, &item).await.unwrap_err();
        assert!(err.to_string().contains("video.mp4 changed after capture"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_file_fails_the_enrichment() {
        let mut metadata = Metadata::new("https://example.com/v");
        metadata.set_main_file(Media::new("/nonexistent/archivist/video.mp4", "h"));
        let item = ArchiveItem::new("https://example.com/v", FeedContext::default(), "/tmp".into());

        assert!(HashEnricher.enrich(&metadata, &item).await.is_err());
    }
}
