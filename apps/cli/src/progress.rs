//! Terminal progress for a run, rendered with indicatif.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use archivist_core::{PipelineState, RunProgress};
use archivist_shared::{ArchiveResult, Status};
use indicatif::{ProgressBar, ProgressStyle};

/// One spinner for the whole run, plus a line per finished URL.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
    finished: AtomicUsize,
    /// Suppress per-URL lines when results go to stdout as JSON.
    quiet: bool,
}

impl CliProgress {
    pub(crate) fn new(quiet: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            finished: AtomicUsize::new(0),
            quiet,
        }
    }

    pub(crate) fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl RunProgress for CliProgress {
    fn state(&self, url: &str, state: PipelineState) {
        let done = self.finished.load(Ordering::Relaxed);
        self.spinner.set_message(format!("[{done} done] {state} {url}"));
    }

    fn finished(&self, result: &ArchiveResult) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        if self.quiet {
            return;
        }
        self.spinner.println(result_lines(result).join("\n"));
    }
}

/// One line for the URL, then one indented line per failed plugin instance
/// when the result is partial or failed.
pub(crate) fn result_lines(result: &ArchiveResult) -> Vec<String> {
    let label = if result.cached {
        "cached"
    } else {
        result.status.as_str()
    };
    let mut lines = vec![format!("  {label:>8}  {}", result.url)];
    if matches!(result.status, Status::Failed | Status::Partial) {
        for (plugin, message) in result.failures() {
            lines.push(format!("            {plugin}: {message}"));
        }
    }
    lines
}
