//! Shared data model, error type, and configuration for Archivist.
//!
//! This crate is the foundation depended on by all other Archivist crates.
//! It provides:
//! - [`ArchivistError`]: the unified error type
//! - The data model ([`Metadata`], [`Media`], [`Value`], [`Status`], [`ArchiveResult`], [`FeedItem`])
//! - Configuration ([`AppConfig`], [`PluginConfig`], [`OrchestratorOptions`], config loading)

pub mod config;
pub mod error;
pub mod media;
pub mod metadata;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, OrchestratorConfig, OrchestratorOptions, PluginConfig, StepsConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{ArchivistError, Result};
pub use media::{Media, hash_bytes, hash_file};
pub use metadata::{Metadata, Status, Value, keys};
pub use types::{ArchiveResult, FeedContext, FeedItem, canonicalize_url};
