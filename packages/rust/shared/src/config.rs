//! Application configuration for Archivist.
//!
//! User config lives at `~/.archivist/archivist.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ArchivistError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "archivist.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".archivist";

// ---------------------------------------------------------------------------
// Config structs (matching archivist.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Concurrency and scratch-space settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Which plugins run in each stage, in order.
    #[serde(default)]
    pub steps: StepsConfig,

    /// Per-plugin settings, keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, toml::Table>,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum URLs processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum concurrent store operations within one URL.
    #[serde(default = "default_storage_concurrency")]
    pub storage_concurrency: usize,

    /// Root for per-URL scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Keep scratch directories after each URL completes.
    #[serde(default)]
    pub keep_scratch: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            storage_concurrency: default_storage_concurrency(),
            scratch_dir: default_scratch_dir(),
            keep_scratch: false,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_storage_concurrency() -> usize {
    4
}
fn default_scratch_dir() -> String {
    std::env::temp_dir()
        .join("archivist")
        .to_string_lossy()
        .to_string()
}

/// `[steps]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsConfig {
    #[serde(default = "default_feeder")]
    pub feeder: String,

    #[serde(default = "default_archivers")]
    pub archivers: Vec<String>,

    #[serde(default)]
    pub enrichments: Vec<String>,

    #[serde(default)]
    pub formatters: Vec<String>,

    #[serde(default)]
    pub storages: Vec<String>,

    #[serde(default)]
    pub databases: Vec<String>,
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            feeder: default_feeder(),
            archivers: default_archivers(),
            enrichments: Vec::new(),
            formatters: Vec::new(),
            storages: Vec::new(),
            databases: Vec::new(),
        }
    }
}

fn default_feeder() -> String {
    "list_feeder".into()
}
fn default_archivers() -> Vec<String> {
    vec!["http_archiver".into()]
}

impl AppConfig {
    /// Settings table for one plugin (empty when not configured).
    pub fn plugin(&self, name: &str) -> PluginConfig {
        PluginConfig::new(name, self.plugins.get(name).cloned().unwrap_or_default())
    }

    /// Reject configurations that cannot process any URL.
    pub fn validate(&self) -> Result<()> {
        if self.steps.archivers.is_empty() {
            return Err(ArchivistError::fatal(
                "at least one archiver must be listed in [steps].archivers",
            ));
        }
        if self.orchestrator.workers == 0 {
            return Err(ArchivistError::fatal("[orchestrator].workers must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plugin config
// ---------------------------------------------------------------------------

/// The `[plugins.<name>]` table handed to a plugin constructor.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    name: String,
    table: toml::Table,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>, table: toml::Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(toml::Value::as_str)
    }

    /// Deserialize the whole table into a typed settings struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        toml::Value::Table(self.table.clone())
            .try_into::<T>()
            .map_err(|e| ArchivistError::config(format!("[plugins.{}]: {e}", self.name)))
    }
}

// ---------------------------------------------------------------------------
// Runtime options (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime orchestrator options, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub workers: usize,
    pub storage_concurrency: usize,
    pub scratch_dir: PathBuf,
    pub keep_scratch: bool,
}

impl From<&AppConfig> for OrchestratorOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.orchestrator.workers,
            storage_concurrency: config.orchestrator.storage_concurrency.max(1),
            scratch_dir: expand_home(&config.orchestrator.scratch_dir),
            keep_scratch: config.orchestrator.keep_scratch,
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.archivist/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArchivistError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.archivist/archivist.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ArchivistError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ArchivistError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArchivistError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArchivistError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArchivistError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("workers"));
        assert!(toml_str.contains("http_archiver"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.orchestrator.workers, 4);
        assert_eq!(parsed.steps.feeder, "list_feeder");
        assert_eq!(parsed.steps.archivers, vec!["http_archiver".to_string()]);
    }

    #[test]
    fn config_with_steps_and_plugins() {
        let toml_str = r#"
[orchestrator]
workers = 2
scratch_dir = "/tmp/archivist-scratch"

[steps]
feeder = "file_feeder"
archivers = ["http_archiver"]
enrichments = ["hash_enricher", "page_meta_enricher"]
storages = ["local_storage"]
databases = ["console_db", "ledger_db"]

[plugins.local_storage]
root = "/srv/archive"

[plugins.http_archiver]
timeout_secs = 10
exclude_patterns = ["/login/**"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.orchestrator.workers, 2);
        assert_eq!(config.steps.enrichments.len(), 2);
        assert_eq!(config.steps.databases, vec!["console_db", "ledger_db"]);

        let storage = config.plugin("local_storage");
        assert_eq!(storage.name(), "local_storage");
        assert_eq!(storage.get_str("root"), Some("/srv/archive"));

        #[derive(Deserialize)]
        struct Http {
            timeout_secs: u64,
            exclude_patterns: Vec<String>,
        }
        let http: Http = config.plugin("http_archiver").parse().unwrap();
        assert_eq!(http.timeout_secs, 10);
        assert_eq!(http.exclude_patterns, vec!["/login/**"]);

        // Unconfigured plugins get an empty table
        assert!(config.plugin("console_db").get_str("anything").is_none());
    }

    #[test]
    fn plugin_config_parses_typed_struct() {
        #[derive(Debug, Deserialize)]
        struct Settings {
            root: String,
            #[serde(default)]
            overwrite: bool,
        }

        let table: toml::Table = toml::from_str(r#"root = "/data""#).unwrap();
        let settings: Settings = PluginConfig::new("local_storage", table).parse().unwrap();
        assert_eq!(settings.root, "/data");
        assert!(!settings.overwrite);

        let err = PluginConfig::new("local_storage", toml::Table::new())
            .parse::<Settings>()
            .unwrap_err();
        assert!(err.to_string().contains("plugins.local_storage"));
    }

    #[test]
    fn validation_rejects_empty_archivers() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.steps.archivers.clear();
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());

        let mut config = AppConfig::default();
        config.orchestrator.workers = 0;
        assert!(config.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn options_from_app_config() {
        let mut app = AppConfig::default();
        app.orchestrator.storage_concurrency = 0;
        app.orchestrator.scratch_dir = "/tmp/scratch".into();
        let options = OrchestratorOptions::from(&app);
        assert_eq!(options.workers, 4);
        assert_eq!(options.storage_concurrency, 1);
        assert_eq!(options.scratch_dir, PathBuf::from("/tmp/scratch"));
        assert!(!options.keep_scratch);
    }
}
