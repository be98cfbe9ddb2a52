//! modgate - command-line front end for the module loader
//!
//! Commands:
//! - modgate enable <name> - Load a module and its dependencies, add it to the enabled list
//! - modgate disable <name> - Remove a module from the enabled list
//! - modgate list - Show the catalog
//! - modgate info <name> - Show one module in detail
//! - modgate sign <name> - Write a detached signature
//! - modgate install <file> <name> - Copy a module into the catalog
//! - modgate load - Load the whole catalog (or the enabled list) in dependency order
//! - modgate status - Show module states after a batch load

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use modgate::config::{LoadScope, LoaderConfig};
use modgate::module::{EnableOutcome, LoadReport, ModuleManager, ModuleState};
use modgate::utils::{cancel_on_shutdown_signal, init_logging_from_config};

#[derive(Parser)]
#[command(name = "modgate")]
#[command(about = "Dependency-aware module loader", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog root (overrides configuration)
    #[arg(long, global = true)]
    modules_dir: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose tracing
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a module and its dependencies
    Enable {
        /// Module name
        name: String,

        /// Bypass security rejection and re-run an already loaded module
        #[arg(short, long)]
        force: bool,
    },

    /// Remove a module from the enabled list
    Disable {
        /// Module name
        name: String,
    },

    /// List catalog modules
    List {
        /// Include modules in subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show one module in detail
    Info {
        /// Module name
        name: String,
    },

    /// Write a detached signature for a module
    Sign {
        /// Module name
        name: String,
    },

    /// Copy a module file into the catalog
    Install {
        /// Source file
        source: PathBuf,

        /// Module name
        name: String,

        /// Subdirectory of the catalog root
        #[arg(short, long)]
        subdir: Option<String>,

        /// Replace an existing module
        #[arg(short, long)]
        force: bool,
    },

    /// Load modules in dependency order
    Load {
        /// Load only enabled modules and their dependencies
        #[arg(long)]
        enabled: bool,

        /// Maximum modules executing at once
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Bypass security rejection
        #[arg(short, long)]
        force: bool,
    },

    /// Load modules and print the state of each
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match LoaderConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("modgate: invalid configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = &cli.modules_dir {
        config.modules_dir = dir.clone();
    }
    config.quiet |= cli.quiet;
    config.debug |= cli.debug;
    if let Commands::Load {
        enabled,
        jobs,
        force,
    } = &cli.command
    {
        if *enabled {
            config.load_scope = LoadScope::Enabled;
        }
        if let Some(jobs) = jobs {
            config.max_concurrency = *jobs;
        }
        config.force |= *force;
    }
    if let Err(e) = config.validate() {
        eprintln!("modgate: invalid configuration: {:#}", e);
        return ExitCode::from(2);
    }

    init_logging_from_config(&config);

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("modgate: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: LoaderConfig) -> anyhow::Result<ExitCode> {
    let json = cli.json;
    let manager = ModuleManager::new(config);

    match cli.command {
        Commands::Enable { name, force } => match manager.enable(&name, force).await? {
            EnableOutcome::AlreadyLoaded => println!("{} already loaded", name),
            EnableOutcome::Loaded(output) => {
                print!("{}", output.stdout);
                println!("{} enabled", name);
            }
        },

        Commands::Disable { name } => {
            let outcome = manager.disable(&name).await?;
            if json {
                print_json(&outcome)?;
            } else if outcome.was_enabled {
                println!("{} disabled", name);
                for dependent in &outcome.enabled_dependents {
                    println!("warning: enabled module {} depends on {}", dependent, name);
                }
            } else {
                println!("{} was not enabled", name);
            }
        }

        Commands::List { recursive } => {
            let listing = manager.list(recursive).await?;
            if json {
                print_json(&listing)?;
            } else {
                for entry in &listing {
                    println!(
                        "{} {:<24} {:<10} {:<9} {}",
                        if entry.enabled { "*" } else { " " },
                        entry.name,
                        entry.version.as_deref().unwrap_or("-"),
                        entry.state,
                        entry.description.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Commands::Info { name } => {
            let info = manager.info(&name).await?;
            if json {
                print_json(&info)?;
            } else {
                let d = &info.descriptor;
                println!("name:         {}", d.name);
                println!("path:         {}", d.path.display());
                println!("version:      {}", d.version.as_deref().unwrap_or("-"));
                println!("description:  {}", d.description.as_deref().unwrap_or("-"));
                println!("dependencies: {}", d.dependencies.join(" "));
                println!("dependents:   {}", info.dependents.join(" "));
                if !info.missing_dependencies.is_empty() {
                    println!("missing:      {}", info.missing_dependencies.join(" "));
                }
                println!("enabled:      {}", info.enabled);
                println!("signature:    {:?}", info.signature);
                println!("state:        {}", info.state.state);
            }
        }

        Commands::Sign { name } => {
            let path = manager.sign(&name).await?;
            println!("{}", path.display());
        }

        Commands::Install {
            source,
            name,
            subdir,
            force,
        } => {
            let path = manager
                .install(&source, &name, subdir.as_deref(), force)
                .await?;
            println!("{}", path.display());
        }

        Commands::Load { .. } => return load(&manager, json, false).await,

        Commands::Status => return load(&manager, json, true).await,
    }

    Ok(ExitCode::SUCCESS)
}

async fn load(manager: &ModuleManager, json: bool, status_only: bool) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_shutdown_signal(cancel.clone());
    let report = manager.load_all(cancel.clone()).await;
    watcher.abort();
    let report = report?;

    if json {
        print_json(&report)?;
    } else if status_only {
        for (name, entry) in &report.states {
            println!("{:<24} {}", name, entry.state);
        }
    } else {
        print_report(&report);
    }

    Ok(if report.all_loaded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &LoadReport) {
    for (index, wave) in report.waves.iter().enumerate() {
        println!("wave {}: {}", index + 1, wave.join(" "));
    }
    for (name, entry) in &report.states {
        match &entry.detail {
            Some(detail) => println!("{:<24} {:<9} {}", name, entry.state, detail),
            None => println!("{:<24} {}", name, entry.state),
        }
        for warning in &entry.warnings {
            println!("{:<24} warning: {}", "", warning);
        }
    }
    for name in &report.unknown_enabled {
        println!("{:<24} not in catalog", name);
    }
    println!(
        "{} loaded, {} failed, {} rejected, {} skipped in {:?}{}",
        report.with_state(ModuleState::Loaded).len(),
        report.with_state(ModuleState::Failed).len(),
        report.with_state(ModuleState::Rejected).len(),
        report.with_state(ModuleState::Skipped).len(),
        report.elapsed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
