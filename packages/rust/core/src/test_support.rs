//! Scripted plugins that record every call, for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use archivist_shared::{ArchiveResult, FeedItem, Media, Metadata, Status, keys};

use crate::contracts::{
    ArchiveItem, Archiver, CaptureError, Database, Enrichment, Feeder, Formatter, StageError,
    StageResult, Storage,
};

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Shared, ordered record of plugin calls (`"<plugin>.<method>"`).
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Archiver
// ---------------------------------------------------------------------------

/// What a scripted archiver does when called.
#[derive(Clone)]
pub enum Script {
    NotApplicable,
    /// Returns `{main_file: video.mp4, media: [video.mp4]}` with success status.
    Success,
    /// Returns a record without success status.
    Incomplete,
    Fail(&'static str),
    Panic,
}

pub struct ScriptedArchiver {
    name: String,
    script: Script,
    log: CallLog,
    delay: Option<Duration>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl ScriptedArchiver {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            log: CallLog::default(),
            delay: None,
            gauge: None,
        }
    }

    pub fn logging(mut self, log: &CallLog) -> Self {
        self.log = log.clone();
        self
    }

    pub fn delayed(mut self, delay: Duration, gauge: &Arc<ConcurrencyGauge>) -> Self {
        self.delay = Some(delay);
        self.gauge = Some(Arc::clone(gauge));
        self
    }
}

#[async_trait]
impl Archiver for ScriptedArchiver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download(&self, item: &ArchiveItem) -> Result<Metadata, CaptureError> {
        self.log.record(format!("{}.download", self.name));
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        match &self.script {
            Script::NotApplicable => Err(CaptureError::NotApplicable),
            Script::Fail(msg) => Err(CaptureError::failed(*msg)),
            Script::Panic => panic!("{} blew up", self.name),
            Script::Incomplete => Ok(Metadata::new(&item.url).with("partial_capture", true)),
            Script::Success => {
                let mut output = Metadata::new(&item.url).with("captured_by", self.name.as_str());
                output.set_main_file(Media::new(item.scratch_dir.join("video.mp4"), "hash-video"));
                Ok(output.success())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

enum EnrichBehavior {
    Adds { key: String, value: String },
    Thumbnail,
    Fails(String),
    Panics,
}

pub struct ScriptedEnrichment {
    name: String,
    behavior: EnrichBehavior,
    log: CallLog,
}

impl ScriptedEnrichment {
    pub fn adds(name: &str, key: &str, value: &str) -> Self {
        Self::with(name, EnrichBehavior::Adds {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn thumbnail(name: &str) -> Self {
        Self::with(name, EnrichBehavior::Thumbnail)
    }

    pub fn fails(name: &str, msg: &str) -> Self {
        Self::with(name, EnrichBehavior::Fails(msg.to_string()))
    }

    pub fn panics(name: &str) -> Self {
        Self::with(name, EnrichBehavior::Panics)
    }

    fn with(name: &str, behavior: EnrichBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            log: CallLog::default(),
        }
    }

    pub fn logging(mut self, log: &CallLog) -> Self {
        self.log = log.clone();
        self
    }
}

#[async_trait]
impl Enrichment for ScriptedEnrichment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enrich(&self, _metadata: &Metadata, item: &ArchiveItem) -> StageResult<Metadata> {
        self.log.record(format!("{}.enrich", self.name));
        match &self.behavior {
            EnrichBehavior::Adds { key, value } => {
                Ok(Metadata::new(&item.url).with(key.as_str(), value.as_str()))
            }
            EnrichBehavior::Thumbnail => Ok(Metadata::new(&item.url).with_media(
                Media::new(item.scratch_dir.join("thumb.jpg"), "hash-thumb")
                    .with_key(keys::THUMBNAIL),
            )),
            EnrichBehavior::Fails(msg) => Err(StageError::failed(msg.clone())),
            EnrichBehavior::Panics => panic!("index out of bounds"),
        }
    }
}

// ---------------------------------------------------------------------------
// Formatter
// ---------------------------------------------------------------------------

pub struct ScriptedFormatter {
    name: String,
    fail: bool,
    log: CallLog,
}

impl ScriptedFormatter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            log: log.clone(),
        }
    }

    pub fn failing(name: &str, log: &CallLog) -> Self {
        Self {
            fail: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl Formatter for ScriptedFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn format(&self, metadata: &Metadata, item: &ArchiveItem) -> StageResult<Media> {
        // Record which properties the formatter saw, to check stage ordering
        let keys: Vec<&str> = metadata.properties().keys().map(String::as_str).collect();
        self.log
            .record(format!("{}.format[{}]", self.name, keys.join(",")));
        if self.fail {
            return Err(StageError::failed("template missing"));
        }
        Ok(Media::new(item.scratch_dir.join("report.html"), "hash-report").with_key("report"))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Storage that echoes the local path as the remote location.
pub struct EchoStorage {
    name: String,
    fail: bool,
    log: CallLog,
}

impl EchoStorage {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            log: log.clone(),
        }
    }

    pub fn failing(name: &str, log: &CallLog) -> Self {
        Self {
            fail: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl Storage for EchoStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, media: &Media, _item: &ArchiveItem) -> StageResult<Media> {
        self.log
            .record(format!("{}.store[{}]", self.name, media.content_hash()));
        if self.fail {
            return Err(StageError::failed("bucket unavailable"));
        }
        let mut stored = media.clone();
        let location = media
            .local_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        stored.set_location(&self.name, location);
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

enum DbBehavior {
    Proceed,
    Cached,
    Skip,
    Broken,
    Panics,
}

pub struct ScriptedDb {
    name: String,
    behavior: DbBehavior,
    log: CallLog,
}

impl ScriptedDb {
    pub fn proceed(name: &str, log: &CallLog) -> Self {
        Self::with(name, DbBehavior::Proceed, log)
    }

    pub fn cached(name: &str, log: &CallLog) -> Self {
        Self::with(name, DbBehavior::Cached, log)
    }

    pub fn skip(name: &str, log: &CallLog) -> Self {
        Self::with(name, DbBehavior::Skip, log)
    }

    pub fn broken(name: &str, log: &CallLog) -> Self {
        Self::with(name, DbBehavior::Broken, log)
    }

    /// Panics on every call.
    pub fn panicking(name: &str, log: &CallLog) -> Self {
        Self::with(name, DbBehavior::Panics, log)
    }

    fn with(name: &str, behavior: DbBehavior, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            log: log.clone(),
        }
    }

    fn broken_call(&self) -> StageResult<()> {
        match self.behavior {
            DbBehavior::Broken => Err(StageError::failed("connection refused")),
            DbBehavior::Panics => panic!("ledger poisoned"),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Database for ScriptedDb {
    fn name(&self) -> &str {
        &self.name
    }

    async fn should_process(&self, _url: &str) -> StageResult<bool> {
        self.log.record(format!("{}.should_process", self.name));
        self.broken_call()?;
        Ok(matches!(self.behavior, DbBehavior::Proceed))
    }

    async fn exists(&self, _url: &str) -> StageResult<bool> {
        self.log.record(format!("{}.exists", self.name));
        self.broken_call()?;
        Ok(matches!(self.behavior, DbBehavior::Cached))
    }

    async fn fetch(&self, url: &str) -> StageResult<ArchiveResult> {
        self.log.record(format!("{}.fetch", self.name));
        self.broken_call()?;
        let mut metadata = Metadata::new(url).with("from_ledger", self.name.as_str());
        metadata.set_status(Status::Success);
        Ok(ArchiveResult::from_metadata(metadata))
    }

    async fn started(&self, _url: &str) -> StageResult<()> {
        self.log.record(format!("{}.started", self.name));
        self.broken_call()
    }

    async fn done(&self, result: &ArchiveResult) -> StageResult<()> {
        self.log
            .record(format!("{}.done[{}]", self.name, result.status));
        self.broken_call()
    }
}

// ---------------------------------------------------------------------------
// Feeder
// ---------------------------------------------------------------------------

pub struct VecFeeder {
    items: VecDeque<FeedItem>,
    pulled: Arc<AtomicUsize>,
}

impl VecFeeder {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            items: urls.iter().map(|u| FeedItem::new(*u)).collect(),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of items handed out so far.
    pub fn pulled(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pulled)
    }
}

#[async_trait]
impl Feeder for VecFeeder {
    fn name(&self) -> &str {
        "vec_feeder"
    }

    async fn next(&mut self) -> archivist_shared::Result<Option<FeedItem>> {
        let item = self.items.pop_front();
        if item.is_some() {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(item)
    }
}
