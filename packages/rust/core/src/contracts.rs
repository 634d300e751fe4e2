//! Capability contracts implemented by plugins.
//!
//! Every stage of the pipeline talks to its plugins only through these
//! traits. Which implementations run, and in which order, is decided by
//! configuration through the [`Registry`](crate::registry::Registry).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use archivist_shared::{ArchiveResult, ArchivistError, FeedContext, FeedItem, Media, Metadata};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned by [`Archiver::download`].
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// This archiver does not handle the URL; try the next one.
    #[error("not applicable")]
    NotApplicable,

    /// The archiver attempted the capture and failed.
    #[error("capture failed: {0}")]
    Failed(String),

    /// The plugin call exceeded its own timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] ArchivistError),
}

impl CaptureError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Error returned by enrichment, formatter, storage and database calls.
/// Always isolated to the plugin instance that produced it.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] ArchivistError),
}

impl StageError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Result alias for stage plugin calls.
pub type StageResult<T> = std::result::Result<T, StageError>;

// ---------------------------------------------------------------------------
// ArchiveItem
// ---------------------------------------------------------------------------

/// What a plugin gets to know about the URL being processed.
#[derive(Debug, Clone)]
pub struct ArchiveItem {
    /// Canonical URL.
    pub url: String,
    /// Per-URL overrides from the feeder.
    pub context: FeedContext,
    /// Scratch directory owned by this URL; plugins confine file output here.
    pub scratch_dir: PathBuf,
}

impl ArchiveItem {
    pub fn new(url: impl Into<String>, context: FeedContext, scratch_dir: PathBuf) -> Self {
        Self {
            url: url.into(),
            context,
            scratch_dir,
        }
    }

    pub fn folder(&self) -> Option<&str> {
        self.context.folder.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of URLs to process.
///
/// Pull-based: `next` may block on an external source and returns `None`
/// at the end of the sequence.
#[async_trait]
pub trait Feeder: Send {
    fn name(&self) -> &str;

    async fn next(&mut self) -> archivist_shared::Result<Option<FeedItem>>;
}

/// Primary capture of a URL.
#[async_trait]
pub trait Archiver: Send + Sync {
    fn name(&self) -> &str;

    /// Capture `item.url`. A returned record with `success` status ends the
    /// capture stage; `NotApplicable` hands the URL to the next archiver.
    async fn download(&self, item: &ArchiveItem) -> Result<Metadata, CaptureError>;
}

/// Adds derived facts or files to already-captured metadata.
#[async_trait]
pub trait Enrichment: Send + Sync {
    fn name(&self) -> &str;

    /// Return only the additions; the orchestrator merges them in.
    async fn enrich(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Metadata>;
}

/// Renders the accumulated metadata into a single summary artifact.
#[async_trait]
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    async fn format(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Media>;
}

/// Persists a media to a durable location.
///
/// Must be idempotent: storing the same content hash twice yields the same
/// remote location.
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Return the media with a location entry keyed by [`Storage::name`].
    async fn store(&self, media: &Media, item: &ArchiveItem) -> StageResult<Media>;
}

/// Dedup and completion ledger.
///
/// The defaults describe a no-op ledger that always lets work proceed.
/// A failing call must not corrupt ledger state for other URLs.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    async fn should_process(&self, _url: &str) -> StageResult<bool> {
        Ok(true)
    }

    async fn exists(&self, _url: &str) -> StageResult<bool> {
        Ok(false)
    }

    async fn fetch(&self, url: &str) -> StageResult<ArchiveResult> {
        Err(StageError::failed(format!("{}: no stored result for {url}", self.name())))
    }

    async fn started(&self, _url: &str) -> StageResult<()> {
        Ok(())
    }

    async fn done(&self, _result: &ArchiveResult) -> StageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDb;

    #[async_trait]
    impl Database for NoopDb {
        fn name(&self) -> &str {
            "noop"
        }
    }

    #[tokio::test]
    async fn default_database_always_proceeds() {
        let db = NoopDb;
        assert!(db.should_process("https://example.com").await.unwrap());
        assert!(!db.exists("https://example.com").await.unwrap());
        assert!(db.fetch("https://example.com").await.is_err());
        assert!(db.started("https://example.com").await.is_ok());
    }

    #[test]
    fn capture_error_from_shared_error() {
        let err: CaptureError = ArchivistError::Network("connection reset".into()).into();
        assert!(matches!(err, CaptureError::Other(_)));
        assert_eq!(err.to_string(), "network error: connection reset");
        assert_eq!(CaptureError::NotApplicable.to_string(), "not applicable");
    }
}
