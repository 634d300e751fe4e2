//! The recursive, mergeable record that flows through every pipeline stage.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::Media;

/// Well-known property keys with typed accessors on [`Metadata`].
pub mod keys {
    pub const TITLE: &str = "title";
    pub const HASH: &str = "hash";
    pub const TIMESTAMP: &str = "timestamp";
    pub const FAILURES: &str = "failures";
    /// When the orchestrator finished processing the URL.
    pub const ARCHIVED_AT: &str = "archived_at";
    /// Media labels resolved by [`super::Metadata::screenshot`] / [`super::Metadata::thumbnail`].
    pub const SCREENSHOT: &str = "screenshot";
    pub const THUMBNAIL: &str = "thumbnail";
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Processing status of one archived unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Skipped,
    Success,
    Partial,
    Failed,
}

impl Status {
    /// Terminal statuses are never changed once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::ArchivistError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "skipped" => Ok(Self::Skipped),
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(crate::error::ArchivistError::parse(format!(
                "unknown status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A property value: a scalar, a media, or a nested metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Media(Media),
    Nested(Box<Metadata>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&Media> {
        match self {
            Self::Media(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Metadata> {
        match self {
            Self::Nested(m) => Some(m),
            _ => None,
        }
    }

    /// Human-readable rendering used by reports and logs.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Timestamp(t) => t.to_rfc3339(),
            Self::Media(m) => m
                .remote_location()
                .map(String::from)
                .or_else(|| m.file_name())
                .unwrap_or_else(|| m.content_hash().to_string()),
            Self::Nested(m) => format!("{} properties", m.properties().len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Media> for Value {
    fn from(m: Media) -> Self {
        Self::Media(m)
    }
}

impl From<Metadata> for Value {
    fn from(m: Metadata) -> Self {
        Self::Nested(Box::new(m))
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// The unit of work and its result.
///
/// Created empty (`pending`) when a URL starts processing, grown by every
/// stage through [`Metadata::merge`], and frozen once handed back to the
/// run driver inside an `ArchiveResult`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    status: Status,
    url: String,
    /// Content hash of the primary artifact; resolves into `media`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    main_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    media: Vec<Media>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
}

impl Metadata {
    /// A fresh, pending record for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Combine two records describing the same URL.
    ///
    /// - keys only on one side are kept;
    /// - scalar keys on both sides keep `right` when `overwrite_left`, else `left`;
    /// - nested records on both sides merge recursively with the same flag;
    /// - `media` is concatenated, left first;
    /// - `main_file` is taken from `right` when it has one and either the
    ///   flag permits or `left` has none.
    ///
    /// The status is always `left`'s: stage output never drives status.
    pub fn merge(left: Metadata, right: Metadata, overwrite_left: bool) -> Metadata {
        let mut merged = left;
        merged.merge_from(right, overwrite_left);
        merged
    }

    /// In-place form of [`Metadata::merge`] with `self` as the left side.
    pub fn merge_from(&mut self, other: Metadata, overwrite_left: bool) {
        if self.url.is_empty() {
            self.url = other.url;
        }

        if let Some(main) = other.main_file {
            if overwrite_left || self.main_file.is_none() {
                self.main_file = Some(main);
            }
        }

        self.media.extend(other.media);

        for (key, incoming) in other.properties {
            match self.properties.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                Entry::Occupied(mut slot) => match (slot.get_mut(), incoming) {
                    (Value::Nested(existing), Value::Nested(incoming)) => {
                        existing.merge_from(*incoming, overwrite_left);
                    }
                    (existing, incoming) => {
                        if overwrite_left {
                            *existing = incoming;
                        }
                    }
                },
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self) -> Status {
        self.status
    }

    /// Move to `status` unless the current status is terminal.
    /// Returns whether the status changed.
    pub fn set_status(&mut self, status: Status) -> bool {
        if self.status.is_terminal() {
            tracing::debug!(
                url = %self.url,
                current = %self.status,
                requested = %status,
                "ignoring status change on terminal metadata"
            );
            return false;
        }
        self.status = status;
        true
    }

    /// Convenience for plugins: mark this (stage output) record successful.
    pub fn success(mut self) -> Self {
        self.set_status(Status::Success);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    // -----------------------------------------------------------------------
    // URL
    // -----------------------------------------------------------------------

    pub fn url(&self) -> &str {
        &self.url
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    pub fn media(&self) -> &[Media] {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut [Media] {
        &mut self.media
    }

    /// Append a media; the sequence is append-only.
    pub fn add_media(&mut self, media: Media) {
        self.media.push(media);
    }

    /// Builder-style [`Metadata::add_media`].
    pub fn with_media(mut self, media: Media) -> Self {
        self.add_media(media);
        self
    }

    /// The primary artifact, resolved against `media`.
    pub fn main_file(&self) -> Option<&Media> {
        let hash = self.main_file.as_deref()?;
        self.media.iter().find(|m| m.content_hash() == hash)
    }

    /// Make `media` the primary artifact, appending it unless an artifact
    /// with the same content hash is already present.
    pub fn set_main_file(&mut self, media: Media) {
        let hash = media.content_hash().to_string();
        if !self.media.iter().any(|m| m.content_hash() == hash) {
            self.media.push(media);
        }
        self.main_file = Some(hash);
    }

    /// First media carrying the given role label.
    pub fn media_by_key(&self, key: &str) -> Option<&Media> {
        self.media.iter().find(|m| m.key() == Some(key))
    }

    pub fn screenshot(&self) -> Option<&Media> {
        self.media_by_key(keys::SCREENSHOT)
    }

    pub fn thumbnail(&self) -> Option<&Media> {
        self.media_by_key(keys::THUMBNAIL)
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder-style [`Metadata::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn title(&self) -> Option<&str> {
        self.get(keys::TITLE).and_then(Value::as_str)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set(keys::TITLE, Value::Text(title.into()));
    }

    pub fn hash(&self) -> Option<&str> {
        self.get(keys::HASH).and_then(Value::as_str)
    }

    pub fn set_hash(&mut self, hash: impl Into<String>) {
        self.set(keys::HASH, Value::Text(hash.into()));
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(keys::TIMESTAMP).and_then(Value::as_timestamp)
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.set(keys::TIMESTAMP, timestamp);
    }

    /// Properties without the bookkeeping keys, for reports.
    pub fn clean_properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties
            .iter()
            .filter(|(k, _)| k.as_str() != keys::FAILURES)
    }

    /// Nothing captured yet: no media and no properties.
    pub fn is_empty(&self) -> bool {
        self.media.is_empty() && self.clean_properties().next().is_none()
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    /// Record an isolated plugin failure under `failures.<stage>.<plugin>`.
    pub fn record_failure(&mut self, stage: &str, plugin: &str, message: impl Into<String>) {
        let entry = Metadata::default().with(format!("{stage}.{plugin}"), Value::Text(message.into()));
        let failures = Metadata::default().with(keys::FAILURES, entry);
        self.merge_from(failures, true);
    }

    /// Recorded failures as `(<stage>.<plugin>, message)` pairs.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.get(keys::FAILURES)
            .and_then(Value::as_nested)
            .map(|f| {
                f.properties()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.display()))
                    .collect()
            })
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        let mut m = Metadata::new("https://example.com/post/1");
        for (k, v) in pairs {
            m.set(*k, *v);
        }
        m
    }

    #[test]
    fn merge_disjoint_keys_is_union() {
        let a = meta(&[("a", "1")]);
        let b = meta(&[("b", "2")]);
        let c = meta(&[("c", "3")]);

        let left_first = Metadata::merge(Metadata::merge(a.clone(), b.clone(), true), c.clone(), true);
        let right_first = Metadata::merge(a, Metadata::merge(b, c, true), true);

        for (key, expected) in [("a", "1"), ("b", "2"), ("c", "3")] {
            assert_eq!(left_first.get(key).and_then(Value::as_str), Some(expected));
        }
        assert_eq!(left_first, right_first);
    }

    #[test]
    fn merge_overwrite_flag_picks_side() {
        let a = meta(&[("k", "left")]);
        let b = meta(&[("k", "right")]);

        let over = Metadata::merge(a.clone(), b.clone(), true);
        assert_eq!(over.get("k").and_then(Value::as_str), Some("right"));

        let keep = Metadata::merge(a, b, false);
        assert_eq!(keep.get("k").and_then(Value::as_str), Some("left"));
    }

    #[test]
    fn merge_nested_recursively() {
        let left = Metadata::default().with(
            "profile",
            Metadata::default().with("name", "alice").with("posts", 3i64),
        );
        let right = Metadata::default().with(
            "profile",
            Metadata::default().with("posts", 4i64).with("bio", "hi"),
        );

        let merged = Metadata::merge(left.clone(), right.clone(), true);
        let profile = merged.get("profile").and_then(Value::as_nested).unwrap();
        assert_eq!(profile.get("name").and_then(Value::as_str), Some("alice"));
        assert_eq!(profile.get("posts").and_then(Value::as_i64), Some(4));
        assert_eq!(profile.get("bio").and_then(Value::as_str), Some("hi"));

        let kept = Metadata::merge(left, right, false);
        let profile = kept.get("profile").and_then(Value::as_nested).unwrap();
        assert_eq!(profile.get("posts").and_then(Value::as_i64), Some(3));
        assert_eq!(profile.get("bio").and_then(Value::as_str), Some("hi"));
    }

    #[test]
    fn merge_concatenates_media_in_order() {
        let left = Metadata::default()
            .with_media(Media::new("/tmp/a.jpg", "a"))
            .with_media(Media::new("/tmp/b.jpg", "b"));
        let right = Metadata::default().with_media(Media::new("/tmp/a.jpg", "a"));

        let merged = Metadata::merge(left, right, true);
        let hashes: Vec<&str> = merged.media().iter().map(Media::content_hash).collect();
        assert_eq!(hashes, vec!["a", "b", "a"]);
    }

    #[test]
    fn merge_main_file_respects_flag() {
        let mut left = Metadata::default();
        left.set_main_file(Media::new("/tmp/video.mp4", "v1"));
        let mut right = Metadata::default();
        right.set_main_file(Media::new("/tmp/other.mp4", "v2"));

        let kept = Metadata::merge(left.clone(), right.clone(), false);
        assert_eq!(kept.main_file().map(Media::content_hash), Some("v1"));

        let over = Metadata::merge(left.clone(), right, true);
        assert_eq!(over.main_file().map(Media::content_hash), Some("v2"));

        // Incoming side without a main file never clears it
        let untouched = Metadata::merge(left, Metadata::default().with("x", "y"), true);
        assert_eq!(untouched.main_file().map(Media::content_hash), Some("v1"));

        // Left without a main file adopts the incoming one regardless of flag
        let mut incoming = Metadata::default();
        incoming.set_main_file(Media::new("/tmp/v.mp4", "v3"));
        let adopted = Metadata::merge(Metadata::default(), incoming, false);
        assert_eq!(adopted.main_file().map(Media::content_hash), Some("v3"));
    }

    #[test]
    fn merge_keeps_left_status() {
        let left = Metadata::new("u");
        let right = Metadata::new("u").success();
        let merged = Metadata::merge(left, right, true);
        assert_eq!(merged.status(), Status::Pending);
    }

    #[test]
    fn terminal_status_is_never_changed() {
        let mut m = Metadata::new("u");
        assert!(m.set_status(Status::Partial));
        assert!(m.set_status(Status::Success));
        assert!(!m.set_status(Status::Failed));
        assert_eq!(m.status(), Status::Success);

        let mut skipped = Metadata::new("u");
        assert!(skipped.set_status(Status::Skipped));
        assert!(!skipped.set_status(Status::Pending));
    }

    #[test]
    fn set_main_file_does_not_duplicate() {
        let mut m = Metadata::new("u");
        let video = Media::new("/tmp/video.mp4", "hash-v");
        m.add_media(video.clone());
        m.set_main_file(video);
        assert_eq!(m.media().len(), 1);
        assert_eq!(m.main_file().and_then(Media::file_name).as_deref(), Some("video.mp4"));
    }

    #[test]
    fn main_file_sees_storage_updates() {
        let mut m = Metadata::new("u");
        m.set_main_file(Media::new("/tmp/video.mp4", "hash-v"));
        m.media_mut()[0].set_location("local", "/archive/video.mp4");
        assert_eq!(
            m.main_file().and_then(Media::remote_location),
            Some("/archive/video.mp4")
        );
    }

    #[test]
    fn failures_accumulate_under_namespaced_keys() {
        let mut m = Metadata::new("u").with("title", "A page");
        m.record_failure("enrich", "screenshot", "browser crashed");
        m.record_failure("store", "s3", "403 Forbidden");

        let failures = m.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.contains(&("enrich.screenshot".into(), "browser crashed".into())));
        assert!(failures.contains(&("store.s3".into(), "403 Forbidden".into())));
        // Bookkeeping is hidden from reports
        assert_eq!(m.clean_properties().count(), 1);
    }

    #[test]
    fn well_known_accessors() {
        let mut m = Metadata::new("u");
        assert!(m.is_empty());
        m.set_title("Hello");
        m.set_hash("sha256:abc");
        let now = Utc::now();
        m.set_timestamp(now);
        m.add_media(Media::new("/tmp/t.jpg", "t").with_key(keys::THUMBNAIL));

        assert_eq!(m.title(), Some("Hello"));
        assert_eq!(m.hash(), Some("sha256:abc"));
        assert_eq!(m.timestamp(), Some(now));
        assert_eq!(m.thumbnail().map(Media::content_hash), Some("t"));
        assert!(m.screenshot().is_none());
        assert!(!m.is_empty());
    }

    #[test]
    fn json_roundtrip_preserves_tree() {
        let mut m = Metadata::new("https://example.com")
            .with("count", 2i64)
            .with("nested", Metadata::default().with("inner", true));
        m.set_main_file(Media::new("/tmp/page.html", "h"));
        m.set_status(Status::Success);

        let json = m.to_json().unwrap();
        let parsed = Metadata::from_json(&json).unwrap();
        assert_eq!(parsed, m);
        assert_eq!(parsed.status(), Status::Success);
    }

    #[test]
    fn status_parse_and_display() {
        for status in [
            Status::Pending,
            Status::Skipped,
            Status::Success,
            Status::Partial,
            Status::Failed,
        ] {
            let parsed: Status = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("archived".parse::<Status>().is_err());
        assert!(!Status::Partial.is_terminal());
    }
}
