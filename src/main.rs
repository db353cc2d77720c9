// ABOUTME: CLI entrypoint for the marksync command
// ABOUTME: Dispatches commands, flushes the run log, persists store and config

use clap::Parser;
use marksync::cli::{Cli, Commands};
use marksync::config::Settings;
use marksync::export::run_export;
use marksync::import::run_import;
use marksync::model::ExportFilter;
use marksync::repo::MemoryRepository;
use marksync::sync::{SyncAdapter, SyncOverrides};
use marksync::{Error, Result, RunLog};
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    if let Err(e) = run() {
        eprintln!("marksync: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load(&config_path)?;
    let mut repo = MemoryRepository::load(&cli.store)?;
    let mut log = RunLog::new();

    let outcome = dispatch(&cli, &mut repo, &mut settings, &config_path, &mut log);

    // The per-run debug log is surfaced to the operator exactly once.
    let _ = log.flush_to(&mut std::io::stderr());
    repo.save(&cli.store)?;

    outcome
}

fn dispatch(
    cli: &Cli,
    repo: &mut MemoryRepository,
    settings: &mut Settings,
    config_path: &Path,
    log: &mut RunLog,
) -> Result<()> {
    match cli.command.clone() {
        Commands::Export {
            status,
            author,
            from,
            to,
            include_exported,
            output,
            sync,
        } => {
            let filter = ExportFilter {
                status,
                author,
                start_date: from,
                end_date: to,
                exclude_exported: !include_exported,
            };
            let outcome = run_export(repo, &filter, log)?;

            if sync {
                let mut adapter = SyncAdapter::new(settings.sync.clone())?;
                let context = format!("filters: {}", serde_json::to_string(&filter)?);
                adapter.push_files(&outcome.files, &context, &SyncOverrides::default(), log);
                persist_refreshed_token(&adapter, settings, config_path)?;
            }

            let path = output.unwrap_or_else(|| PathBuf::from(&outcome.download_name));
            fs::write(&path, &outcome.archive)?;
            println!(
                "Exported {} items to {}",
                outcome.files.len(),
                path.display()
            );
            Ok(())
        }

        Commands::Import {
            file,
            from_github,
            from_drive,
            sync,
        } => {
            let mut adapter = SyncAdapter::new(settings.sync.clone())?;

            let (name, bytes) = if let Some(path) = from_github {
                let remote = adapter.fetch_github(&path)?;
                (remote.name, remote.bytes)
            } else if let Some(id) = from_drive {
                let remote = adapter.fetch_drive(&id, log)?;
                (remote.name, remote.bytes)
            } else if let Some(path) = file {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("import")
                    .to_string();
                (name, fs::read(&path)?)
            } else {
                return Err(Error::UserInput(
                    "provide a file, --from-github, or --from-drive".into(),
                ));
            };

            let stats = run_import(repo, &bytes, &name, log)?;

            if sync {
                let context = format!(
                    "import {} (processed={}, updated={}, created={}, skipped={})",
                    name, stats.processed, stats.updated, stats.created, stats.skipped
                );
                adapter.push_payload(&name, &bytes, &context, &SyncOverrides::default(), log);
            }
            persist_refreshed_token(&adapter, settings, config_path)?;

            println!(
                "Import completed: processed={}, updated={}, created={}, skipped={}",
                stats.processed, stats.updated, stats.created, stats.skipped
            );
            Ok(())
        }

        Commands::Sync => {
            let filter = ExportFilter {
                exclude_exported: true,
                ..Default::default()
            };
            let outcome = run_export(repo, &filter, log)?;

            let overrides = SyncOverrides::from_configuration(&settings.sync);
            let mut adapter = SyncAdapter::new(settings.sync.clone())?;
            let context = format!("filters: {}", serde_json::to_string(&filter)?);
            adapter.push_files(&outcome.files, &context, &overrides, log);
            persist_refreshed_token(&adapter, settings, config_path)?;

            println!("Synced {} items to remote targets", outcome.files.len());
            Ok(())
        }
    }
}

fn persist_refreshed_token(
    adapter: &SyncAdapter,
    settings: &mut Settings,
    config_path: &Path,
) -> Result<()> {
    if adapter.token_refreshed() {
        settings.sync = adapter.settings().clone();
        settings.save(config_path)?;
    }
    Ok(())
}
