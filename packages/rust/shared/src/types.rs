//! Run-level domain types: feed items and archive results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::metadata::{Metadata, Status};

/// Query parameters dropped during canonicalization.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "igshid", "mc_cid", "mc_eid"];

// ---------------------------------------------------------------------------
// FeedItem
// ---------------------------------------------------------------------------

/// Per-URL overrides supplied by a feeder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedContext {
    /// Destination folder for stored media. Storages write to their root when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Free-form feeder-specific values (e.g. a sheet row number).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// One unit pulled from a feeder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub url: String,
    #[serde(default)]
    pub context: FeedContext,
}

impl FeedItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: FeedContext::default(),
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.context.folder = Some(folder.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ArchiveResult
// ---------------------------------------------------------------------------

/// The externally visible outcome of processing one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub status: Status,
    pub url: String,
    pub metadata: Metadata,
    /// Served from a ledger instead of being processed in this run.
    #[serde(default)]
    pub cached: bool,
}

impl ArchiveResult {
    /// Freeze a processed metadata record into a result.
    pub fn from_metadata(metadata: Metadata) -> Self {
        Self {
            status: metadata.status(),
            url: metadata.url().to_string(),
            metadata,
            cached: false,
        }
    }

    /// Mark a result as served from a ledger.
    pub fn into_cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Plugin failures recorded while processing, as `(<stage>.<plugin>, message)`.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.metadata.failures()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// URL canonicalization
// ---------------------------------------------------------------------------

/// Canonicalize a URL for use as the dedup key.
///
/// Strips the fragment, tracking query parameters and a trailing slash on
/// non-root paths. Input that does not parse as a URL is returned trimmed so
/// archivers can still decide whether they handle it.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
