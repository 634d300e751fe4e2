//! Per-URL pipeline: dedup → capture → enrich → format → store → record.
//!
//! Stages for one URL run strictly in sequence, each consuming the merged
//! output of the previous one. Only the store stage fans out, and its
//! results are merged back by this task after every store call has joined.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use archivist_shared::{
    ArchiveResult, ArchivistError, FeedItem, Metadata, OrchestratorOptions, Result, Status,
    canonicalize_url, keys,
};

use crate::contracts::{ArchiveItem, CaptureError};
use crate::coordinator::{Decision, DedupCoordinator};
use crate::guard::{guarded, stage_call};
use crate::registry::Plugins;

/// Failure namespaces, recorded as `failures.<stage>.<plugin>`.
pub mod stage {
    pub const CAPTURE: &str = "capture";
    pub const ENRICH: &str = "enrich";
    pub const FORMAT: &str = "format";
    pub const STORE: &str = "store";
    pub const DATABASE: &str = "database";
    pub const RUN: &str = "run";
}

// ---------------------------------------------------------------------------
// State & progress
// ---------------------------------------------------------------------------

/// Where a URL is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    CheckingDedup,
    Skipped,
    Cached,
    Capturing,
    Enriching,
    Formatting,
    Storing,
    Recorded,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CheckingDedup => "checking dedup",
            Self::Skipped => "skipped",
            Self::Cached => "cached",
            Self::Capturing => "capturing",
            Self::Enriching => "enriching",
            Self::Formatting => "formatting",
            Self::Storing => "storing",
            Self::Recorded => "recorded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Cached | Self::Recorded | Self::Failed
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called when a URL enters a new state.
    fn state(&self, url: &str, state: PipelineState);
    /// Called once per fed URL with its final result.
    fn finished(&self, result: &ArchiveResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn state(&self, _url: &str, _state: PipelineState) {}
    fn finished(&self, _result: &ArchiveResult) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives URLs through the configured plugins.
pub struct Orchestrator {
    plugins: Plugins,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Fails with a fatal configuration error when no URL could ever be captured.
    pub fn new(plugins: Plugins, options: OrchestratorOptions) -> Result<Self> {
        if plugins.archivers.is_empty() {
            return Err(ArchivistError::fatal("no archivers configured"));
        }
        if options.workers == 0 {
            return Err(ArchivistError::fatal("worker bound must be at least 1"));
        }
        Ok(Self { plugins, options })
    }

    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Process one URL to a terminal state.
    ///
    /// Never fails: plugin errors are isolated and recorded on the result.
    /// When `cancel` fires, the current stage finishes, later stages are
    /// skipped, and databases still receive `done`.
    #[instrument(skip_all, fields(url = %item.url))]
    pub async fn archive(
        &self,
        item: FeedItem,
        scratch_dir: PathBuf,
        cancel: &CancellationToken,
        progress: &dyn RunProgress,
    ) -> ArchiveResult {
        let url = canonicalize_url(&item.url);
        let item = ArchiveItem::new(url.clone(), item.context, scratch_dir);
        let mut metadata = Metadata::new(&url);

        if cancel.is_cancelled() {
            debug!("cancelled before dedup, not processing");
            metadata.record_failure(stage::RUN, "cancel", "run cancelled before processing");
            metadata.set_status(Status::Skipped);
            progress.state(&url, PipelineState::Skipped);
            return ArchiveResult::from_metadata(metadata);
        }

        // --- Dedup ---
        progress.state(&url, PipelineState::CheckingDedup);
        let mut ledger_failures = Vec::new();
        let decision = DedupCoordinator::new(&self.plugins.databases)
            .check(&url, &mut ledger_failures)
            .await;
        for failure in ledger_failures {
            metadata.record_failure(stage::DATABASE, &failure.database, failure.message);
        }

        match decision {
            Decision::Cached { database, result } => {
                info!(%database, status = %result.status, "served from ledger");
                progress.state(&url, PipelineState::Cached);
                return result;
            }
            Decision::Skip { database } => {
                info!(%database, "skipped by ledger");
                metadata.set_status(Status::Skipped);
                progress.state(&url, PipelineState::Skipped);
                return ArchiveResult::from_metadata(metadata);
            }
            Decision::Proceed => {}
        }

        // --- Capture ---
        progress.state(&url, PipelineState::Capturing);
        if !self.capture(&item, &mut metadata).await {
            warn!("no archiver captured the URL");
            metadata.set_status(Status::Failed);
            progress.state(&url, PipelineState::Failed);
            return self.record(metadata).await;
        }

        // --- Enrich → Format → Store ---
        let mut degraded = false;
        for next in [
            PipelineState::Enriching,
            PipelineState::Formatting,
            PipelineState::Storing,
        ] {
            if cancel.is_cancelled() {
                info!(stage = %next, "run cancelled, skipping remaining stages");
                metadata.record_failure(
                    stage::RUN,
                    "cancel",
                    format!("run cancelled before {next}"),
                );
                degraded = true;
                break;
            }
            progress.state(&url, next);
            degraded |= match next {
                PipelineState::Enriching => self.enrich(&item, &mut metadata).await,
                PipelineState::Formatting => self.format(&item, &mut metadata).await,
                _ => self.store(&item, &mut metadata).await,
            };
        }

        // --- Record ---
        metadata.set(keys::ARCHIVED_AT, Utc::now());
        metadata.set_status(if degraded {
            Status::Partial
        } else {
            Status::Success
        });
        progress.state(&url, PipelineState::Recorded);
        self.record(metadata).await
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Try archivers in order until one returns a successful record.
    async fn capture(&self, item: &ArchiveItem, metadata: &mut Metadata) -> bool {
        for archiver in &self.plugins.archivers {
            let name = archiver.name();
            let outcome = guarded(archiver.download(item))
                .await
                .unwrap_or_else(|panic| Err(CaptureError::failed(panic.to_string())));
            match outcome {
                Ok(output) if output.is_success() => {
                    debug!(archiver = name, media = output.media().len(), "captured");
                    metadata.merge_from(output, true);
                    return true;
                }
                Ok(output) => {
                    warn!(archiver = name, status = %output.status(), "archiver returned without success");
                    metadata.record_failure(
                        stage::CAPTURE,
                        name,
                        format!("returned status {}", output.status()),
                    );
                }
                Err(CaptureError::NotApplicable) => {
                    debug!(archiver = name, "not applicable");
                }
                Err(e) => {
                    warn!(archiver = name, error = %e, "capture failed");
                    metadata.record_failure(stage::CAPTURE, name, e.to_string());
                }
            }
        }
        false
    }

    /// Run every enrichment; returns whether any failed.
    async fn enrich(&self, item: &ArchiveItem, metadata: &mut Metadata) -> bool {
        let mut failed = false;
        for enrichment in &self.plugins.enrichments {
            let name = enrichment.name();
            match stage_call(enrichment.enrich(metadata, item)).await {
                Ok(output) => metadata.merge_from(output, true),
                Err(e) => {
                    warn!(enrichment = name, error = %e, "enrichment failed");
                    metadata.record_failure(stage::ENRICH, name, e.to_string());
                    failed = true;
                }
            }
        }
        failed
    }

    /// Run every formatter, appending each artifact to the media list.
    async fn format(&self, item: &ArchiveItem, metadata: &mut Metadata) -> bool {
        let mut failed = false;
        for formatter in &self.plugins.formatters {
            let name = formatter.name();
            match stage_call(formatter.format(metadata, item)).await {
                Ok(artifact) => metadata.add_media(artifact),
                Err(e) => {
                    warn!(formatter = name, error = %e, "formatter failed");
                    metadata.record_failure(stage::FORMAT, name, e.to_string());
                    failed = true;
                }
            }
        }
        failed
    }

    /// Store every media in every storage, at most `storage_concurrency`
    /// calls at a time. Locations are merged after all calls have joined.
    async fn store(&self, item: &ArchiveItem, metadata: &mut Metadata) -> bool {
        if self.plugins.storages.is_empty() || metadata.media().is_empty() {
            return false;
        }

        let semaphore = Arc::new(Semaphore::new(self.options.storage_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, media) in metadata.media().iter().enumerate() {
            for (position, storage) in self.plugins.storages.iter().enumerate() {
                let storage = Arc::clone(storage);
                let media = media.clone();
                let item = item.clone();
                let semaphore = Arc::clone(&semaphore);

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let outcome = stage_call(storage.store(&media, &item)).await;
                    (index, position, storage.name().to_string(), outcome)
                });
            }
        }

        let mut outcomes = Vec::new();
        let mut failed = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(error = %e, "store task aborted");
                    metadata.record_failure(stage::STORE, "task", e.to_string());
                    failed = true;
                }
            }
        }

        // Apply in (media, storage) order so location maps are deterministic
        outcomes.sort_by_key(|(index, position, ..)| (*index, *position));
        for (index, _, name, outcome) in outcomes {
            match outcome {
                Ok(stored) => {
                    if let Some(media) = metadata.media_mut().get_mut(index) {
                        media.merge_locations(&stored);
                    }
                }
                Err(e) => {
                    let label = metadata
                        .media()
                        .get(index)
                        .and_then(|m| m.file_name())
                        .unwrap_or_else(|| index.to_string());
                    warn!(storage = %name, media = %label, error = %e, "store failed");
                    metadata.record_failure(stage::STORE, &format!("{name}[{label}]"), e.to_string());
                    failed = true;
                }
            }
        }
        failed
    }

    /// Freeze the record and hand it to every database.
    async fn record(&self, metadata: Metadata) -> ArchiveResult {
        let mut result = ArchiveResult::from_metadata(metadata);

        let mut failures = Vec::new();
        for db in &self.plugins.databases {
            if let Err(e) = stage_call(db.done(&result)).await {
                warn!(database = db.name(), error = %e, "done failed");
                failures.push((db.name().to_string(), e.to_string()));
            }
        }
        for (database, message) in failures {
            result
                .metadata
                .record_failure(stage::DATABASE, &database, message);
        }

        info!(status = %result.status, media = result.metadata.media().len(), "recorded");
        result
    }
}
