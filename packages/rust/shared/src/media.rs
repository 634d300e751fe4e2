//! A single produced file and where it has been stored.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ArchivistError, Result};

/// One artifact (file) produced while archiving a URL.
///
/// The content hash is computed once when the media is created and is never
/// recomputed; it is the identity storages and ledgers deduplicate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Path on the per-URL scratch directory while the file is resident locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_path: Option<PathBuf>,
    /// MIME type, guessed from the file name when the producer did not set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    /// SHA-256 (hex) of the file content.
    content_hash: String,
    /// Optional role label, e.g. `thumbnail` or `html_report`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    /// Storage name → remote location (URL or identifier).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    locations: BTreeMap<String, String>,
}

impl Media {
    /// Create a media from a file on disk, hashing its content.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content_hash = hash_file(&path)?;
        Ok(Self::new(path, content_hash))
    }

    /// Create a media whose hash the producer already computed (e.g. while streaming).
    pub fn new(local_path: impl Into<PathBuf>, content_hash: impl Into<String>) -> Self {
        let local_path = local_path.into();
        let mime_type = mime_guess::from_path(&local_path)
            .first()
            .map(|m| m.essence_str().to_string());
        Self {
            local_path: Some(local_path),
            mime_type,
            content_hash: content_hash.into(),
            key: None,
            locations: BTreeMap::new(),
        }
    }

    /// Set the role label.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Override the guessed MIME type.
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// File name of the local path, if any.
    pub fn file_name(&self) -> Option<String> {
        self.local_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
    }

    /// File extension including the leading dot (`.html`), or empty.
    pub fn extension(&self) -> String {
        self.local_path
            .as_ref()
            .and_then(|p| p.extension())
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }

    /// All remote locations, keyed by storage name.
    pub fn locations(&self) -> &BTreeMap<String, String> {
        &self.locations
    }

    /// Remote location recorded by a specific storage.
    pub fn location(&self, storage: &str) -> Option<&str> {
        self.locations.get(storage).map(String::as_str)
    }

    /// The first remote location (by storage name), if any storage accepted this media.
    pub fn remote_location(&self) -> Option<&str> {
        self.locations.values().next().map(String::as_str)
    }

    pub fn set_location(&mut self, storage: impl Into<String>, location: impl Into<String>) {
        self.locations.insert(storage.into(), location.into());
    }

    /// Copy the remote locations another copy of this media picked up.
    pub fn merge_locations(&mut self, other: &Media) {
        for (storage, location) in &other.locations {
            self.locations.insert(storage.clone(), location.clone());
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_prefix("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_prefix("video/")
    }

    pub fn is_audio(&self) -> bool {
        self.mime_prefix("audio/")
    }

    fn mime_prefix(&self, prefix: &str) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with(prefix))
    }
}

/// Compute the SHA-256 (hex) of in-memory content.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 (hex) of a file without loading it into memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ArchivistError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| ArchivistError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
