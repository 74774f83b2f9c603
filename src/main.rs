use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use credsift::cli::Args;
use credsift::dictionary::PasswordDictionary;
use credsift::engine::CrackEngine;
use credsift::models::{ProgressEvent, ProgressStatus};
use credsift::output::{OutputSink, Quarantine};
use credsift::{parser, summary};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    info!("Starting credential harvest run");
    let started = Utc::now();

    // Ctrl-C finishes the in-flight archive and stops at the job boundary.
    let cancel = Arc::new(AtomicBool::new(false));
    install_cancel_handler(Arc::clone(&cancel));

    let dictionary = PasswordDictionary::load(&args.dictionary);
    let quarantine = Quarantine::new(&args.quarantine_dir)?;
    let mut sink = OutputSink::new(&args.output)?;

    let mut engine = CrackEngine::new(&dictionary, &quarantine, &args.pass_dir, cancel)
        .with_progress(Box::new(log_progress));
    let stats = engine
        .run(&args.input, args.recursive)
        .with_context(|| format!("archive sweep of {} failed", args.input.display()))?;

    let harvest = parser::harvest_directory(&args.pass_dir, &mut sink)
        .with_context(|| format!("harvest of {} failed", args.pass_dir.display()))?;

    let summary_dir = summary_dir(&args);
    let summary_path = summary::write_run_summary(&summary_dir, started, &stats, &harvest)?;
    summary::log_run_summary(&stats, &harvest);
    info!("Run summary written to {}", summary_path.display());

    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

fn install_cancel_handler(cancel: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::Relaxed);
    });
    if let Err(e) = result {
        warn!("Could not install Ctrl-C handler: {e}");
    }
}

fn log_progress(event: &ProgressEvent) {
    match event.status {
        ProgressStatus::Attempt => debug!(
            "  candidate {}/{} against {}",
            event.current, event.total, event.file_name
        ),
        _ => debug!(
            "{:?} {} ({}/{})",
            event.status, event.file_name, event.current, event.total
        ),
    }
}

fn summary_dir(args: &Args) -> PathBuf {
    if let Some(dir) = &args.summary_dir {
        return dir.clone();
    }
    args.input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
