//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archivist_core::{Feeder, Orchestrator, PluginKind, Registry, RunReport};
use archivist_plugins::{FileFeeder, ListFeeder};
use archivist_shared::{
    AppConfig, OrchestratorOptions, Status, config_file_path, init_config, load_config,
    load_config_from,
};

use crate::progress::{CliProgress, result_lines};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Archivist: capture, enrich, store and record web content.
#[derive(Parser)]
#[command(
    name = "archivist",
    version,
    about = "Archive URLs through a configurable pipeline of capture, enrichment, storage and ledger plugins.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.archivist/archivist.toml).
    #[arg(long, global = true, env = "ARCHIVIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Archive the given URLs.
    Archive {
        /// URLs to archive.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Storage folder for every URL.
        #[arg(short, long)]
        folder: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Archive every URL from an input file or the configured feeder.
    Run {
        /// One URL per line; `#` starts a comment, a tab separates a folder.
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List available plugins by kind.
    Plugins,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides shared by the commands that run the pipeline.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Maximum URLs processed concurrently.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Keep per-URL scratch directories.
    #[arg(long)]
    pub keep_scratch: bool,

    /// Print each result as a JSON line on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "archivist=info",
        1 => "archivist=debug",
        _ => "archivist=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command, returning the process exit code.
pub(crate) async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Archive { urls, folder, run } => {
            let config = resolve_config(cli.config.as_ref(), &run)?;
            let feeder = ListFeeder::new(&urls, folder.as_deref());
            execute(&config, Box::new(feeder), &run).await
        }
        Command::Run { input, run } => {
            let config = resolve_config(cli.config.as_ref(), &run)?;
            let feeder: Box<dyn Feeder> = match input {
                Some(path) => Box::new(FileFeeder::new(path)),
                None => registry().build_feeder(&config.steps.feeder, &config)?,
            };
            execute(&config, feeder, &run).await
        }
        Command::Plugins => cmd_plugins(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_ref()),
        },
    }
}

/// Every plugin this binary ships, by name.
fn registry() -> Registry {
    let mut registry = Registry::new();
    archivist_plugins::register_builtin(&mut registry);
    archivist_ledger::register(&mut registry);
    registry
}

fn load(path: Option<&PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Config file values with CLI flags applied on top.
fn resolve_config(path: Option<&PathBuf>, run: &RunArgs) -> Result<AppConfig> {
    let mut config = load(path)?;
    if let Some(workers) = run.workers {
        config.orchestrator.workers = workers;
    }
    if run.keep_scratch {
        config.orchestrator.keep_scratch = true;
    }
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn execute(config: &AppConfig, mut feeder: Box<dyn Feeder>, run: &RunArgs) -> Result<i32> {
    let plugins = registry().build_plugins(config)?;
    let orchestrator = Arc::new(Orchestrator::new(plugins, OrchestratorOptions::from(config))?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight work");
            on_signal.cancel();
        }
    });

    info!(
        feeder = feeder.name(),
        workers = config.orchestrator.workers,
        archivers = ?config.steps.archivers,
        "archiving"
    );

    let progress = Arc::new(CliProgress::new(run.json));
    let report = orchestrator
        .feed(feeder.as_mut(), &cancel, progress.clone())
        .await?;
    progress.clear();

    if run.json {
        for result in &report.results {
            println!("{}", result.to_json()?);
        }
    } else {
        print_summary(&report);
    }

    Ok(report.exit_code())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("  URLs:      {}", report.results.len());
    println!("  Success:   {}", report.count(Status::Success));
    println!("  Partial:   {}", report.count(Status::Partial));
    println!("  Failed:    {}", report.count(Status::Failed));
    println!("  Skipped:   {}", report.count(Status::Skipped));
    println!("  Cached:    {}", report.cached());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    if let Some(error) = &report.feeder_error {
        println!("  Feeder:    stopped early: {error}");
    }
    if report.cancelled {
        println!("  Cancelled: remaining URLs were not fed");
    }

    let problems: Vec<_> = report
        .results
        .iter()
        .filter(|r| matches!(r.status, Status::Failed | Status::Partial))
        .collect();
    if !problems.is_empty() {
        println!();
        println!("  Failed plugins:");
        for result in problems {
            for line in result_lines(result) {
                println!("{line}");
            }
        }
    }
    println!();
}

fn cmd_plugins() -> Result<i32> {
    let registry = registry();
    for kind in PluginKind::ALL {
        println!("{kind}:");
        for name in registry.names(kind) {
            println!("  {name}");
        }
    }
    Ok(0)
}

fn cmd_config_init() -> Result<i32> {
    let path = config_file_path()?;
    if path.exists() {
        println!("Config already exists at: {}", path.display());
        return Ok(0);
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(0)
}

fn cmd_config_show(path: Option<&PathBuf>) -> Result<i32> {
    let config = load(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(0)
}
