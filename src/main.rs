mod config;
mod confirm;
mod error;
mod installer;
mod pipeline;
mod process;
mod quarantine;
mod runner;
mod scanner;
mod uninstall;

use crate::config::{
    load_config, read_config, resolve_config_source, ConfigSource, RunContext,
    DEFAULT_CONFIG_YAML,
};
use crate::confirm::ConfirmationGate;
use crate::error::FixError;
use crate::installer::{HttpDownloader, InstallOutcome};
use crate::pipeline::{
    run_install_stage, run_repair, run_scan, CleanupMode, RepairOptions, RunOutcome, ScanReport,
    Services, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_NOTHING_TO_DO,
};
use crate::process::SystemProcessTable;
use crate::runner::SystemRunner;
use crate::scanner::format_size;
use clap::{Parser, Subcommand};
use dialoguer::console::style;
use serde::Serialize;
use serde_json::json;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "shfix",
    version,
    about = "Stops, removes and reinstalls a broken MathWorks Service Host"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    /// Repeat for more log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full repair (the default).
    Repair {
        /// Permanently delete old files instead of moving them aside.
        #[arg(long, default_value_t = false)]
        delete: bool,
        #[arg(long, default_value_t = false)]
        skip_install: bool,
    },
    /// Show what a repair would touch without changing anything.
    Scan,
    /// Only download and run the installer.
    Install,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Validate,
    Show,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

fn main() -> Result<(), FixError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    let result = run(cli);
    match result {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(err) => {
            tracing::debug!(error = ?err, "run failed");
            if json {
                let payload = JsonResult::<serde_json::Value> {
                    ok: false,
                    result: None,
                    error: Some(err.to_string()),
                };
                print_json(&payload)?;
            } else {
                eprintln!("{}", style(format!("error: {err}")).red());
            }
            std::process::exit(EXIT_FAILURE);
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<i32, FixError> {
    let source = resolve_config_source(cli.config.as_ref());
    let command = cli.command.unwrap_or(Commands::Repair {
        delete: false,
        skip_install: false,
    });

    // Config commands must work while the file is missing or broken.
    if let Commands::Config { command } = command {
        return handle_config(&source, command, cli.json);
    }

    let config = load_config(&source)?;
    let ctx = RunContext::build(env::current_dir()?, source, config, cli.json)?;
    tracing::debug!(
        working_dir = %ctx.working_dir.display(),
        config = %ctx.config_source.path().display(),
        "run context ready"
    );
    if !cfg!(windows) {
        tracing::warn!("the service host only exists on Windows; paths and programs may not resolve");
    }

    match command {
        Commands::Scan => handle_scan(&ctx),
        Commands::Repair {
            delete,
            skip_install,
        } => {
            reject_json(&ctx, "repair")?;
            let options = RepairOptions {
                cleanup: if delete {
                    CleanupMode::Delete
                } else {
                    CleanupMode::Move
                },
                skip_install,
            };
            handle_repair(&ctx, options)
        }
        Commands::Install => {
            reject_json(&ctx, "install")?;
            handle_install(&ctx)
        }
        Commands::Config { .. } => Ok(0),
    }
}

fn reject_json(ctx: &RunContext, command: &str) -> Result<(), FixError> {
    if ctx.json {
        return Err(FixError::Config(format!(
            "--json is not supported by the interactive `{command}` command"
        )));
    }
    Ok(())
}

fn install_interrupt_handler() -> Result<(), FixError> {
    ctrlc::set_handler(|| {
        eprintln!(
            "\n{}",
            style("Interrupted. Anything already moved stays in the backup folder.").red()
        );
        std::process::exit(EXIT_INTERRUPTED);
    })?;
    Ok(())
}

fn http_downloader(ctx: &RunContext) -> Result<HttpDownloader, FixError> {
    HttpDownloader::new(Duration::from_secs(
        ctx.config.installer.connect_timeout_sec,
    ))
}

fn handle_repair(ctx: &RunContext, options: RepairOptions) -> Result<i32, FixError> {
    install_interrupt_handler()?;
    let downloader = http_downloader(ctx)?;
    let services = Services {
        processes: &SystemProcessTable,
        runner: &SystemRunner,
        downloader: &downloader,
    };
    let mut gate = ConfirmationGate::stdio();
    tracing::debug!(terminal = gate.is_terminal(), "prompting operator");
    let outcome = run_repair(ctx, options, &services, &mut gate)?;
    match &outcome {
        RunOutcome::Completed(report) => {
            tracing::info!(
                entries = report.entries.len(),
                uninstalled = report.uninstalled.len(),
                "repair finished"
            );
        }
        RunOutcome::Declined(stage) => {
            tracing::info!(?stage, "operator declined");
        }
        RunOutcome::NothingToDo => {}
    }
    Ok(outcome.exit_code())
}

fn handle_install(ctx: &RunContext) -> Result<i32, FixError> {
    install_interrupt_handler()?;
    let downloader = http_downloader(ctx)?;
    let services = Services {
        processes: &SystemProcessTable,
        runner: &SystemRunner,
        downloader: &downloader,
    };
    let mut gate = ConfirmationGate::stdio();
    let report = run_install_stage(ctx, &services, &mut gate)?;
    if let InstallOutcome::InstalledWithManualStep { .. } = report.outcome {
        tracing::info!("installer finished with a manual step");
    }
    Ok(0)
}

fn handle_scan(ctx: &RunContext) -> Result<i32, FixError> {
    let report = run_scan(ctx, &SystemProcessTable)?;
    let code = if report.entries.is_empty() {
        EXIT_NOTHING_TO_DO
    } else {
        0
    };
    if ctx.json {
        output(ctx, serde_json::to_value(&report)?)?;
    } else {
        print_scan(&report);
    }
    Ok(code)
}

fn print_scan(report: &ScanReport) {
    if report.running.is_empty() {
        println!("{} is not running.", report.process_name);
    }
    for process in &report.running {
        println!("{} is running with PID {}", process.name, process.pid);
    }
    println!("Service Host folder: {}", report.service_host_root.display());
    if report.entries.is_empty() {
        println!("No installations found.");
        return;
    }
    for entry in &report.entries {
        let label = if entry.is_active() {
            style("active").green()
        } else {
            style("inactive").yellow()
        };
        println!(
            "  {}  {}  ({})",
            entry.name(),
            format_size(entry.size_bytes()),
            label
        );
    }
    println!("A repair would move or delete:");
    for item in &report.cleanup_items {
        println!("  {}", item.display());
    }
}

fn handle_config(source: &ConfigSource, command: ConfigCommand, json: bool) -> Result<i32, FixError> {
    let path = source.path();
    match command {
        ConfigCommand::Init => {
            if path.exists() {
                emit(json, json!({"path": path, "created": false}))?;
                return Ok(0);
            }
            ensure_parent(path)?;
            fs::write(path, DEFAULT_CONFIG_YAML)?;
            emit(json, json!({"path": path, "created": true}))?;
        }
        ConfigCommand::Validate => {
            let _cfg = read_config(path)?;
            emit(json, json!({"path": path, "valid": true}))?;
        }
        ConfigCommand::Show => {
            let cfg = load_config(source)?;
            let paths = config::resolve_paths(&cfg)?;
            if json {
                emit(
                    json,
                    json!({"path": path, "exists": path.exists(), "config": cfg, "paths": paths}),
                )?;
            } else {
                println!("# {}", path.display());
                print!("{}", serde_yaml::to_string(&cfg)?);
                println!("# resolved");
                print!("{}", serde_yaml::to_string(&paths)?);
            }
        }
    }
    Ok(0)
}

fn ensure_parent(path: &Path) -> Result<(), FixError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn output(ctx: &RunContext, payload: serde_json::Value) -> Result<(), FixError> {
    emit(ctx.json, payload)
}

fn emit(json: bool, payload: serde_json::Value) -> Result<(), FixError> {
    if json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), FixError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
