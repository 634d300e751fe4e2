//! Plugin registry: configuration name → constructor.
//!
//! Plugin crates register their constructors explicitly at startup
//! (e.g. `archivist_plugins::register_builtin(&mut registry)`); the registry
//! is then only read to build the plugin instances a configuration names.

use std::collections::BTreeMap;
use std::sync::Arc;

use archivist_shared::{AppConfig, ArchivistError, PluginConfig, Result};

use crate::contracts::{Archiver, Database, Enrichment, Feeder, Formatter, Storage};

pub type FeederFactory = fn(&PluginConfig) -> Result<Box<dyn Feeder>>;
pub type ArchiverFactory = fn(&PluginConfig) -> Result<Arc<dyn Archiver>>;
pub type EnrichmentFactory = fn(&PluginConfig) -> Result<Arc<dyn Enrichment>>;
pub type FormatterFactory = fn(&PluginConfig) -> Result<Arc<dyn Formatter>>;
pub type StorageFactory = fn(&PluginConfig) -> Result<Arc<dyn Storage>>;
pub type DatabaseFactory = fn(&PluginConfig) -> Result<Arc<dyn Database>>;

/// The capability a plugin provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Feeder,
    Archiver,
    Enrichment,
    Formatter,
    Storage,
    Database,
}

impl PluginKind {
    pub const ALL: [PluginKind; 6] = [
        Self::Feeder,
        Self::Archiver,
        Self::Enrichment,
        Self::Formatter,
        Self::Storage,
        Self::Database,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feeder => "feeder",
            Self::Archiver => "archiver",
            Self::Enrichment => "enrichment",
            Self::Formatter => "formatter",
            Self::Storage => "storage",
            Self::Database => "database",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Instantiated stage plugins, each list in configuration order.
#[derive(Default, Clone)]
pub struct Plugins {
    pub archivers: Vec<Arc<dyn Archiver>>,
    pub enrichments: Vec<Arc<dyn Enrichment>>,
    pub formatters: Vec<Arc<dyn Formatter>>,
    pub storages: Vec<Arc<dyn Storage>>,
    pub databases: Vec<Arc<dyn Database>>,
}

impl Plugins {
    pub fn archiver(mut self, archiver: impl Archiver + 'static) -> Self {
        self.archivers.push(Arc::new(archiver));
        self
    }

    pub fn enrichment(mut self, enrichment: impl Enrichment + 'static) -> Self {
        self.enrichments.push(Arc::new(enrichment));
        self
    }

    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatters.push(Arc::new(formatter));
        self
    }

    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storages.push(Arc::new(storage));
        self
    }

    pub fn database(mut self, database: impl Database + 'static) -> Self {
        self.databases.push(Arc::new(database));
        self
    }
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins")
            .field("archivers", &self.archivers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("enrichments", &self.enrichments.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("formatters", &self.formatters.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("storages", &self.storages.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("databases", &self.databases.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds plugin constructors by configuration name.
#[derive(Default)]
pub struct Registry {
    feeders: BTreeMap<String, FeederFactory>,
    archivers: BTreeMap<String, ArchiverFactory>,
    enrichments: BTreeMap<String, EnrichmentFactory>,
    formatters: BTreeMap<String, FormatterFactory>,
    storages: BTreeMap<String, StorageFactory>,
    databases: BTreeMap<String, DatabaseFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_feeder(&mut self, name: &str, factory: FeederFactory) -> &mut Self {
        self.feeders.insert(name.to_string(), factory);
        self
    }

    pub fn register_archiver(&mut self, name: &str, factory: ArchiverFactory) -> &mut Self {
        self.archivers.insert(name.to_string(), factory);
        self
    }

    pub fn register_enrichment(&mut self, name: &str, factory: EnrichmentFactory) -> &mut Self {
        self.enrichments.insert(name.to_string(), factory);
        self
    }

    pub fn register_formatter(&mut self, name: &str, factory: FormatterFactory) -> &mut Self {
        self.formatters.insert(name.to_string(), factory);
        self
    }

    pub fn register_storage(&mut self, name: &str, factory: StorageFactory) -> &mut Self {
        self.storages.insert(name.to_string(), factory);
        self
    }

    pub fn register_database(&mut self, name: &str, factory: DatabaseFactory) -> &mut Self {
        self.databases.insert(name.to_string(), factory);
        self
    }

    /// Registered names for one capability, sorted.
    pub fn names(&self, kind: PluginKind) -> Vec<&str> {
        match kind {
            PluginKind::Feeder => self.feeders.keys().map(String::as_str).collect(),
            PluginKind::Archiver => self.archivers.keys().map(String::as_str).collect(),
            PluginKind::Enrichment => self.enrichments.keys().map(String::as_str).collect(),
            PluginKind::Formatter => self.formatters.keys().map(String::as_str).collect(),
            PluginKind::Storage => self.storages.keys().map(String::as_str).collect(),
            PluginKind::Database => self.databases.keys().map(String::as_str).collect(),
        }
    }

    /// Build the feeder named `name`, configured from `[plugins.<name>]`.
    pub fn build_feeder(&self, name: &str, config: &AppConfig) -> Result<Box<dyn Feeder>> {
        let factory = self
            .feeders
            .get(name)
            .ok_or_else(|| unknown(PluginKind::Feeder, name))?;
        factory(&config.plugin(name))
    }

    /// Build every stage plugin listed in `[steps]`, in order.
    ///
    /// Fails with a fatal configuration error on unknown names or when no
    /// archiver is listed.
    pub fn build_plugins(&self, config: &AppConfig) -> Result<Plugins> {
        config.validate()?;

        let steps = &config.steps;
        let plugins = Plugins {
            archivers: build_list(PluginKind::Archiver, &steps.archivers, &self.archivers, config)?,
            enrichments: build_list(
                PluginKind::Enrichment,
                &steps.enrichments,
                &self.enrichments,
                config,
            )?,
            formatters: build_list(
                PluginKind::Formatter,
                &steps.formatters,
                &self.formatters,
                config,
            )?,
            storages: build_list(PluginKind::Storage, &steps.storages, &self.storages, config)?,
            databases: build_list(PluginKind::Database, &steps.databases, &self.databases, config)?,
        };

        tracing::debug!(?plugins, "plugins built");
        Ok(plugins)
    }
}

fn build_list<T: ?Sized>(
    kind: PluginKind,
    names: &[String],
    factories: &BTreeMap<String, fn(&PluginConfig) -> Result<Arc<T>>>,
    config: &AppConfig,
) -> Result<Vec<Arc<T>>> {
    names
        .iter()
        .map(|name| {
            let factory = factories.get(name).ok_or_else(|| unknown(kind, name))?;
            factory(&config.plugin(name))
        })
        .collect()
}

fn unknown(kind: PluginKind, name: &str) -> ArchivistError {
    ArchivistError::fatal(format!("unknown {kind} '{name}'"))
}
