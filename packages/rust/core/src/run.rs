//! Run driver: pulls URLs from a feeder and processes them concurrently.
//!
//! A single dispatcher draws from the feeder once a worker slot is free, so
//! at most `workers` URLs are in flight. Results come back in feed order.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use archivist_shared::{ArchiveResult, ArchivistError, Metadata, Result, Status, canonicalize_url};

use crate::contracts::Feeder;
use crate::pipeline::{Orchestrator, PipelineState, RunProgress, stage};

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    /// One result per fed URL, in feed order.
    pub results: Vec<ArchiveResult>,
    /// Set when the feeder failed and dispatch stopped early.
    pub feeder_error: Option<String>,
    /// Whether the run was cancelled before the feeder was exhausted.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// Processed (non-cached) results with `status`.
    pub fn count(&self, status: Status) -> usize {
        self.results
            .iter()
            .filter(|r| !r.cached && r.status == status)
            .count()
    }

    pub fn cached(&self) -> usize {
        self.results.iter().filter(|r| r.cached).count()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == Status::Failed)
    }

    /// Non-zero when any URL failed or the feeder broke down.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() || self.feeder_error.is_some() {
            1
        } else {
            0
        }
    }
}

impl Orchestrator {
    /// Process every URL `feeder` yields.
    ///
    /// Only fails when the scratch root cannot be created; everything else
    /// ends up in the report.
    #[instrument(skip_all, fields(feeder = feeder.name(), workers = self.options().workers))]
    pub async fn feed(
        self: &Arc<Self>,
        feeder: &mut dyn Feeder,
        cancel: &CancellationToken,
        progress: Arc<dyn RunProgress>,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let options = self.options().clone();

        tokio::fs::create_dir_all(&options.scratch_dir)
            .await
            .map_err(|e| ArchivistError::io(&options.scratch_dir, e))?;

        let semaphore = Arc::new(Semaphore::new(options.workers));
        let mut tasks = JoinSet::new();
        let mut urls: Vec<String> = Vec::new();
        let mut feeder_error = None;
        let mut cancelled = false;

        info!("starting run");

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = feeder.next() => next,
            };

            let item = match next {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "feeder failed, stopping dispatch");
                    feeder_error = Some(e.to_string());
                    break;
                }
            };

            let index = urls.len();
            urls.push(item.url.clone());
            progress.state(&item.url, PipelineState::Pending);

            let orchestrator = Arc::clone(self);
            let cancel = cancel.clone();
            let progress = Arc::clone(&progress);
            let scratch = options.scratch_dir.join(Uuid::now_v7().to_string());
            let keep_scratch = options.keep_scratch;

            tasks.spawn(async move {
                let _permit = permit;
                prepare_scratch(&scratch).await;
                let result = orchestrator
                    .archive(item, scratch.clone(), &cancel, progress.as_ref())
                    .await;
                if !keep_scratch {
                    remove_scratch(&scratch).await;
                }
                progress.finished(&result);
                (index, result)
            });
        }

        if cancelled {
            info!(dispatched = urls.len(), "cancellation requested, waiting for in-flight URLs");
        }

        let mut slots: Vec<Option<ArchiveResult>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "worker task aborted"),
            }
        }

        let results: Vec<ArchiveResult> = slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| slot.unwrap_or_else(|| aborted(&url)))
            .collect();

        let report = RunReport {
            results,
            feeder_error,
            cancelled,
            elapsed: start.elapsed(),
        };

        info!(
            urls = report.results.len(),
            success = report.count(Status::Success),
            partial = report.count(Status::Partial),
            failed = report.count(Status::Failed),
            skipped = report.count(Status::Skipped),
            cached = report.cached(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );

        Ok(report)
    }
}

async fn prepare_scratch(dir: &Path) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(path = %dir.display(), error = %e, "could not create scratch directory");
    }
}

async fn remove_scratch(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        debug!(path = %dir.display(), error = %e, "could not remove scratch directory");
    }
}

/// Result for a URL whose worker task panicked outside any plugin call.
fn aborted(url: &str) -> ArchiveResult {
    let mut metadata = Metadata::new(&canonicalize_url(url));
    metadata.record_failure(stage::RUN, "worker", "worker task aborted");
    metadata.set_status(Status::Failed);
    ArchiveResult::from_metadata(metadata)
}
