//! Core orchestration for Archivist.
//!
//! This crate defines the plugin contracts, the registry that builds plugin
//! instances from configuration, and the orchestrator that drives each URL
//! through dedup → capture → enrich → format → store → record.

pub mod contracts;
pub mod coordinator;
mod guard;
pub mod pipeline;
pub mod registry;
pub mod run;

#[cfg(test)]
mod test_support;

pub use contracts::{
    ArchiveItem, Archiver, CaptureError, Database, Enrichment, Feeder, Formatter, StageError,
    StageResult, Storage,
};
pub use coordinator::{Decision, DedupCoordinator, LedgerFailure};
pub use pipeline::{Orchestrator, PipelineState, RunProgress, SilentProgress, stage};
pub use registry::{PluginKind, Plugins, Registry};
pub use run::RunReport;
