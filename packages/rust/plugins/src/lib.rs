//! Generic built-in plugins for Archivist.
//!
//! This crate provides:
//! - [`feeders`]: list and file feeders
//! - [`archivers`]: HTTP archiver with include/exclude globs and SSRF guard
//! - [`enrichments`]: page metadata and forensic hashes
//! - [`formatters`]: HTML and JSON reports
//! - [`storages`]: content-addressed local storage
//! - [`databases`]: console ledger
//!
//! Call [`register_builtin`] once at startup to make them available by name.

pub mod archivers;
pub mod databases;
pub mod enrichments;
pub mod feeders;
pub mod formatters;
pub mod html;
pub mod scope;
pub mod storages;

use archivist_core::Registry;

pub use archivers::{HttpArchiver, HttpArchiverSettings};
pub use databases::ConsoleDb;
pub use enrichments::{HashEnricher, PageMetaEnricher};
pub use feeders::{FileFeeder, ListFeeder};
pub use formatters::{HtmlFormatter, JsonFormatter};
pub use storages::LocalStorage;

/// Register every built-in plugin under its configuration name.
pub fn register_builtin(registry: &mut Registry) {
    registry
        .register_feeder(ListFeeder::NAME, ListFeeder::from_config)
        .register_feeder(FileFeeder::NAME, FileFeeder::from_config)
        .register_archiver(HttpArchiver::NAME, HttpArchiver::from_config)
        .register_enrichment(PageMetaEnricher::NAME, PageMetaEnricher::from_config)
        .register_enrichment(HashEnricher::NAME, HashEnricher::from_config)
        .register_formatter(HtmlFormatter::NAME, HtmlFormatter::from_config)
        .register_formatter(JsonFormatter::NAME, JsonFormatter::from_config)
        .register_storage(LocalStorage::NAME, LocalStorage::from_config)
        .register_database(ConsoleDb::NAME, ConsoleDb::from_config);
}
