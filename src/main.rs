//! FileWork CLI - incremental bulk copy and merge
//!
//! Thin wrapper around the library facades: parses arguments, sets up
//! logging, runs one command and prints its summary.

use clap::Parser;
use filework::config::{CliArgs, Commands, LogFormat, TuningArgs, WorkerConfig};
use filework::core::{CancellationToken, FileCopier, FileMerger, RunSummary};
use filework::error::{FileWorkError, Result};
use filework::fs::count_accessible_files;
use filework::progress::ProgressReporter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Returns whether every job succeeded
fn run(args: CliArgs) -> Result<bool> {
    match &args.command {
        Commands::Copy {
            source,
            destination,
            replace_all,
            streaming,
            tuning,
        } => {
            let mut config = build_config(&args, tuning)?;
            config.replace_all |= *replace_all;
            cmd_copy(&args, config, source, destination, *streaming)
        }
        Commands::Merge {
            paths,
            no_clean,
            tuning,
        } => {
            let mut config = build_config(&args, tuning)?;
            if *no_clean {
                config.clean_output = false;
            }
            cmd_merge(&args, config, paths)
        }
        Commands::Count { dir } => cmd_count(dir),
    }
}

/// Cancel `cancel` on the first Ctrl+C; a second one exits immediately
fn install_interrupt_handler(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    let spawned = std::thread::Builder::new()
        .name("filework-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!("Ctrl+C handling unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::warn!("Received Ctrl+C, stopping workers...");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });

    if let Err(e) = spawned {
        tracing::warn!("Ctrl+C handling unavailable: {}", e);
    }
}

/// Config file first, then CLI/env tuning on top
fn build_config(args: &CliArgs, tuning: &TuningArgs) -> Result<WorkerConfig> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    config.apply_tuning(tuning)?;

    tracing::info!(
        workers = config.effective_workers(),
        buffer_size = config.effective_buffer_size(),
        replace_all = config.replace_all,
        clean_output = config.clean_output,
        "configuration"
    );
    Ok(config)
}

fn create_progress(args: &CliArgs) -> ProgressReporter {
    if args.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    }
}

fn cmd_copy(
    args: &CliArgs,
    config: WorkerConfig,
    source: &Path,
    destination: &Path,
    streaming: bool,
) -> Result<bool> {
    let mut copier = FileCopier::new(config).with_progress(create_progress(args));
    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);

    let summary = if streaming {
        copier.copy_streaming(source, destination, &cancel)?
    } else {
        copier.enqueue(source, destination)?;
        let stats = copier.collect_stats();
        if args.verbose > 0 {
            println!(
                "Queued {} file(s), {} up to date, {} director(ies) created",
                stats.admitted, stats.skipped, stats.directories_created
            );
        }
        copier.run(&cancel)?
    };

    Ok(report(args, &summary))
}

fn cmd_merge(args: &CliArgs, config: WorkerConfig, paths: &[PathBuf]) -> Result<bool> {
    let Some((destination, sources)) = paths.split_last() else {
        return Err(FileWorkError::config("merge needs at least one source and a destination"));
    };
    if sources.is_empty() {
        return Err(FileWorkError::config("merge needs at least one source and a destination"));
    }

    let mut merger = FileMerger::new(config).with_progress(create_progress(args));
    merger.enqueue_many(sources.iter().map(|source| (source, destination)))?;

    if args.verbose > 0 {
        for job in merger.merge_jobs()? {
            println!("  {}", job);
        }
    }

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);
    let summary = merger.run(&cancel)?;
    Ok(report(args, &summary))
}

fn cmd_count(dir: &Path) -> Result<bool> {
    let count = count_accessible_files(dir)?;
    println!("{} accessible file(s) in {}", count, dir.display());
    Ok(true)
}

fn report(args: &CliArgs, summary: &RunSummary) -> bool {
    if !args.quiet {
        summary.print_summary();
    }
    summary.is_success()
}
