//! Content-addressed storage on the local filesystem.
//!
//! Files land at `<root>/<folder>/<hh>/<hash><ext>`, where `hh` is the first
//! two hex digits of the content hash. The target path depends only on the
//! folder and the hash, so storing the same content twice is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use archivist_core::{ArchiveItem, StageError, StageResult, Storage};
use archivist_shared::{ArchivistError, Media, PluginConfig, Result, expand_home};

/// `[plugins.local_storage]` settings.
#[derive(Debug, Deserialize)]
struct LocalStorageSettings {
    #[serde(default = "default_root")]
    root: String,
}

fn default_root() -> String {
    "~/.archivist/archive".into()
}

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub const NAME: &'static str = "local_storage";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &PluginConfig) -> Result<Arc<dyn Storage>> {
        let settings: LocalStorageSettings = config.parse()?;
        Ok(Arc::new(Self::new(expand_home(&settings.root))))
    }

    /// Where `media` is stored for an item in `folder`.
    pub fn target_path(&self, media: &Media, folder: Option<&str>) -> PathBuf {
        let hash = media.content_hash();
        let prefix: String = hash.chars().take(2).collect();
        let mut path = self.root.clone();
        if let Some(folder) = folder {
            path.push(sanitize_folder(folder));
        }
        path.push(if prefix.is_empty() { "00".to_string() } else { prefix });
        path.push(format!("{hash}{}", media.extension()));
        path
    }
}

/// Keep only normal path components so a folder can never escape the root.
fn sanitize_folder(folder: &str) -> PathBuf {
    folder
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(|part| {
            part.chars()
                .map(|c| if c.is_control() || c == ':' { '_' } else { c })
                .collect::<String>()
        })
        .collect()
}

async fn copy_atomically(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ArchivistError::io(parent, e))?;
    }
    let staging = target.with_extension(format!("partial-{}", Uuid::now_v7()));
    tokio::fs::copy(source, &staging)
        .await
        .map_err(|e| ArchivistError::io(source, e))?;
    tokio::fs::rename(&staging, target)
        .await
        .map_err(|e| ArchivistError::io(target, e))?;
    Ok(())
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn store(&self, media: &Media, item: &ArchiveItem) -> StageResult<Media> {
        let source = media
            .local_path()
            .ok_or_else(|| StageError::failed("media has no local file"))?;
        let target = self.target_path(media, item.folder());

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(target = %target.display(), "already stored");
        } else {
            copy_atomically(source, &target).await?;
            debug!(target = %target.display(), "stored");
        }

        let mut stored = media.clone();
        stored.set_location(Self::NAME, target.display().to_string());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_shared::{FeedContext, hash_bytes};

    struct Fixture {
        dir: PathBuf,
        storage: LocalStorage,
        media: Media,
    }

    fn fixture() -> Fixture {
        let dir = std::env::temp_dir().join(format!("archivist-local-test-{}", Uuid::now_v7()));
        let scratch = dir.join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let file = scratch.join("clip.mp4");
        std::fs::write(&file, b"clip").unwrap();
        Fixture {
            storage: LocalStorage::new(dir.join("archive")),
            media: Media::new(&file, hash_bytes(b"clip")),
            dir,
        }
    }

    fn item(dir: &Path, folder: Option<&str>) -> ArchiveItem {
        let context = FeedContext {
            folder: folder.map(String::from),
            ..FeedContext::default()
        };
        ArchiveItem::new("https://example.com/clip", context, dir.join("scratch"))
    }

    #[tokio::test]
    async fn stores_under_content_address() {
        let f = fixture();
        let stored = f.storage.store(&f.media, &item(&f.dir, Some("case-1"))).await.unwrap();

        let hash = hash_bytes(b"clip");
        let expected = f
            .dir
            .join("archive")
            .join("case-1")
            .join(&hash[..2])
            .join(format!("{hash}.mp4"));
        assert_eq!(stored.location(LocalStorage::NAME), Some(expected.display().to_string().as_str()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"clip");
        // Identity is untouched
        assert_eq!(stored.content_hash(), f.media.content_hash());

        let _ = std::fs::remove_dir_all(&f.dir);
    }

    #[tokio::test]
    async fn storing_twice_is_idempotent() {
        let f = fixture();
        let item = item(&f.dir, None);

        let first = f.storage.store(&f.media, &item).await.unwrap();
        let second = f.storage.store(&f.media, &item).await.unwrap();

        assert_eq!(first.locations(), second.locations());
        let shard = f.dir.join("archive").join(&hash_bytes(b"clip")[..2]);
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);

        let _ = std::fs::remove_dir_all(&f.dir);
    }

    #[test]
    fn folder_cannot_escape_root() {
        let storage = LocalStorage::new("/srv/archive");
        let media = Media::new("/tmp/a.jpg", "abcdef");
        let path = storage.target_path(&media, Some("../../etc/./x"));
        assert_eq!(path, PathBuf::from("/srv/archive/etc/x/ab/abcdef.jpg"));
    }

    #[tokio::test]
    async fn media_without_file_fails() {
        let f = fixture();
        let remote_only: Media = serde_json::from_str(r#"{"content_hash":"abc"}"#).unwrap();
        assert!(f.storage.store(&remote_only, &item(&f.dir, None)).await.is_err());
        let _ = std::fs::remove_dir_all(&f.dir);
    }
}
