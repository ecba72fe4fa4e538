//! Kiosk launcher
//!
//! Usage:
//!     kiosk                          # run with <KIOSK_HOME>/config.toml or defaults
//!     kiosk run --port COM5:115200 --catalog articles.json
//!     kiosk check-config --config kiosk.toml
//!     kiosk init-config

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kiosk::present::Presenter;
use kiosk::run::{self, DriverKind, RunOptions, DEFAULT_REFRESH};
use kiosk::settings::{self, ConfigSource, Overrides};
use kiosk_logging::LogConfig;
use kiosk_presence::{Catalog, TrackerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kiosk", version, about = "Self-checkout kiosk: RFID shelf presence tracking")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: <KIOSK_HOME>/config.toml)
    #[arg(long, global = true, env = "KIOSK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the reader and track the shelf (default)
    Run(RunArgs),

    /// Load and validate the configuration, then print it
    CheckConfig {
        /// Output as JSON only
        #[arg(long)]
        json: bool,
    },

    /// Write a config file with every default filled in
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Reader port, `<port>[:<baud>]` (e.g. COM5:115200)
    #[arg(long)]
    port: Option<String>,

    /// Product catalog (JSON article list)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Consecutive misses before a tag is reported taken
    #[arg(long)]
    max_miss: Option<u32>,

    /// Reader driver
    #[arg(long, value_enum, default_value_t = DriverKind::Simulated)]
    driver: DriverKind,

    /// Screen refresh interval in milliseconds
    #[arg(long)]
    refresh_ms: Option<u64>,

    /// Exit after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = kiosk_logging::init_logging(LogConfig {
        app_name: "kiosk",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => cmd_run(config_path, args),
        Commands::CheckConfig { json } => cmd_check_config(config_path, json),
        Commands::InitConfig { force } => {
            let path = config_path.unwrap_or_else(settings::default_config_path);
            settings::write_default_config(&path, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn cmd_run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let overrides = Overrides {
        port: args.port,
        catalog: args.catalog,
        max_miss: args.max_miss,
    };
    let (config, source) = settings::resolve(config_path.as_deref(), &overrides)?;
    if let ConfigSource::File(path) = &source {
        info!("Using config {}", path.display());
    }

    let options = RunOptions {
        driver: args.driver,
        refresh: args
            .refresh_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REFRESH),
        duration: args.duration_secs.map(Duration::from_secs),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let summary = runtime.block_on(async {
        let mut presenter = Presenter::new(std::io::stdout());
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        };
        run::run(&config, &options, &mut presenter, shutdown).await
    })?;

    info!(
        "Kiosk stopped: {} on shelf, {} taken, {} command advisories",
        summary.final_snapshot.active.len(),
        summary.final_snapshot.removed.len(),
        summary.advisories.len()
    );
    Ok(())
}

fn cmd_check_config(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let (config, source) = settings::resolve(config_path.as_deref(), &Overrides::default())?;

    let catalog_entries = match &config.catalog.path {
        Some(path) => Some(
            Catalog::load(path)
                .with_context(|| format!("Catalog {} is not usable", path.display()))?
                .len(),
        ),
        None => None,
    };

    let rendered = serde_json::to_string_pretty(&config)?;
    if json {
        println!("{}", rendered);
        return Ok(());
    }

    match &source {
        ConfigSource::File(path) => println!("Config: {}", path.display()),
        ConfigSource::Defaults => println!("Config: built-in defaults"),
    }
    let tracker = TrackerConfig::from_section(&config.tracker)?;
    println!(
        "Tags are reported taken after {} missed sweeps (about {:.1}s without a read)",
        tracker.max_miss_count,
        tracker.removal_window().as_secs_f64()
    );
    match catalog_entries {
        Some(count) => println!("Catalog: {} named tags", count),
        None => println!("Catalog: none"),
    }
    println!("{}", rendered);
    Ok(())
}
