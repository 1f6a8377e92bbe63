//! Backup Converter - Main entry point

use anyhow::Result;
use backup_convert::backend::{self, env::Side, BackendContext};
use backup_convert::cli::Args;
use backup_convert::interrupt::InterruptHandler;
use backup_convert::orchestrator::progress::BatchReport;
use backup_convert::orchestrator::{ConvertOptions, Orchestrator};
use backup_convert::prompt::TerminalPrompt;
use backup_convert::session::{ActiveBackupRegistry, SessionOptions};
use backup_convert::utils::{self, errors::EXIT_FAILURE};
use backup_convert::Config;
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    config.apply_env_overrides(
        std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    );

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting backup-convert v{} ({:?})", env!("CARGO_PKG_VERSION"), args.mode);

    // Listen for signals before anything gets mounted
    let registry = ActiveBackupRegistry::new();
    let mut interrupts = InterruptHandler::install(registry.clone())?;

    let outcome = {
        let run = convert(&args, &config, registry);
        tokio::select! {
            biased;
            signal = interrupts.wait_for_signal() => {
                tracing::warn!("Received {}, aborting", signal);
                None
            }
            result = run => Some(result),
        }
    };

    let code = match outcome {
        None => interrupts.abort().await,
        Some(Ok(report)) if report.is_success() => 0,
        Some(Ok(_)) => EXIT_FAILURE,
        Some(Err(e)) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    };

    // A prompt thread still blocked on stdin would keep the runtime alive
    std::process::exit(code)
}

async fn convert(args: &Args, config: &Config, registry: ActiveBackupRegistry) -> backup_convert::Result<BatchReport> {
    let (source_kind, destination_kind) = args.mode.backends();
    let tool_args = args.split_tool_args();
    tracing::info!("Source arguments: {:?}", tool_args.source);
    tracing::info!("Destination arguments: {:?}", tool_args.destination);

    let source = backend::source(
        source_kind,
        BackendContext::new(config, Side::Source, tool_args.source),
    );
    let destination = backend::destination(
        destination_kind,
        BackendContext::new(config, Side::Destination, tool_args.destination),
    );

    let backups = source.list().await?;
    tracing::info!(
        "Found {} backups to convert in the {} source repository.",
        backups.len(),
        source.kind()
    );

    let existing = destination.list().await?;
    tracing::info!(
        "Found {} existing backups in the {} destination repository.",
        existing.len(),
        destination.kind()
    );
    for backup in &existing {
        tracing::debug!("  existing: {}", backup);
    }

    let options = ConvertOptions {
        dry_run: args.dry_run,
        assume_yes: args.assume_yes,
        run_id_format: config.session.run_id_format.clone(),
        session: SessionOptions::new(config.session.temp_prefix.clone()),
    };
    let orchestrator = Orchestrator::new(source, destination, registry, Arc::new(TerminalPrompt), options);

    let selection = orchestrator.select(args.backup_range.as_deref(), &backups).await?;
    orchestrator.run(&selection).await
}
