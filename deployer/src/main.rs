//! Deployer - Entry Point
//!
//! Drives provisioning, deployment, rollback and pruning for the project
//! described by a JSON manifest.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use deployer::app::options::AppOptions;
use deployer::app::run::{start, Runtime};
use deployer::deploy::report::{DeploymentReport, DeploymentStatus};
use deployer::deploy::{Cancellation, ReleaseRequest, SourceSpec};
use deployer::errors::DeployError;
use deployer::filesys::file::File;
use deployer::folders::LinkedFolderRegistry;
use deployer::keys::generator::SshKeygen;
use deployer::logs::{init_logging, LogOptions};
use deployer::models::release::ReleaseId;
use deployer::storage::layout::StorageLayout;
use deployer::storage::manifest::Manifest;
use deployer::storage::records::{MemoryServerRepository, ServerRepository};
use deployer::storage::settings::Settings;
use deployer::utils::version_info;

use tracing::{error, info};

const USAGE: &str = "Usage: deployer --manifest=<file> \
--action=provision|deploy|rollback|prune|releases \
[--release=<id>] [--repository=<url>] [--branch=<name>] [--rekey] [--settings=<file>]";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        print_json(&version_info());
        return;
    }

    let (Some(manifest_path), Some(action)) = (cli_args.get("manifest"), cli_args.get("action"))
    else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Settings::default()
    };

    if settings.log_to_file {
        if let Err(e) = layout.setup().await {
            eprintln!("Unable to prepare {}: {}", layout.base_dir.display(), e);
            std::process::exit(1);
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let manifest_file = File::new(PathBuf::from(manifest_path));
    let options = AppOptions::from_settings(layout, &settings);
    info!("Running deployer action '{}' with options: {:?}", action, options);

    if let Err(e) = run_action(action, &cli_args, &manifest_file, options, &settings).await {
        error!("Action '{}' failed: {}", action, e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_action(
    action: &str,
    cli_args: &HashMap<String, String>,
    manifest_file: &File,
    options: AppOptions,
    settings: &Settings,
) -> Result<(), DeployError> {
    let mut manifest = Manifest::load(manifest_file).await?;
    let records = Arc::new(MemoryServerRepository::with_servers(manifest.servers.clone()));
    let folders = Arc::new(LinkedFolderRegistry::with_folders(manifest.folders.clone()));
    let generator = Arc::new(SshKeygen::from_settings(&settings.keys));

    let runtime = start(options, records.clone(), folders, generator).await?;
    let result = dispatch(action, cli_args, &mut manifest, &runtime, records.as_ref()).await;

    // Provisioned keys are written back even if some servers failed
    if action == "provision" {
        manifest.save(manifest_file).await?;
    }
    runtime.shutdown().await?;
    result
}

async fn dispatch(
    action: &str,
    cli_args: &HashMap<String, String>,
    manifest: &mut Manifest,
    runtime: &Runtime,
    records: &MemoryServerRepository,
) -> Result<(), DeployError> {
    let state = &runtime.state;
    let project = manifest.project.clone();
    let servers = records.list_for_project(project.id).await?;
    let release = cli_args.get("release").map(ReleaseId::parse).transpose()?;

    match action {
        "provision" => {
            let outcomes = state
                .fleet
                .provision_keys(&servers, &state.keys, cli_args.contains_key("rekey"))
                .await;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(key) => println!(
                        "{} {} {}",
                        "provisioned".green(),
                        outcome.server_id,
                        key.fingerprint()
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("{} {} {}", "failed".red(), outcome.server_id, e.summary());
                    }
                }
            }
            manifest.servers = records.list_for_project(project.id).await?;
            if failed > 0 {
                return Err(DeployError::KeyGenerationError(format!(
                    "{} of {} server(s) could not be provisioned",
                    failed,
                    outcomes.len()
                )));
            }
            Ok(())
        }
        "deploy" => {
            let request = ReleaseRequest {
                release_id: release,
                source: cli_args.get("repository").map(|repository| SourceSpec {
                    repository: repository.clone(),
                    branch: cli_args
                        .get("branch")
                        .cloned()
                        .unwrap_or_else(|| "main".to_string()),
                }),
            };

            let (cancel_tx, cancel) = Cancellation::channel();
            let watcher = tokio::spawn(async move {
                await_shutdown_signal().await;
                let _ = cancel_tx.send(true);
            });

            let report = state
                .coordinator
                .deploy(&project, &servers, request, cancel)
                .await;
            watcher.abort();
            print_report(&report?)
        }
        "rollback" => {
            let report = state.coordinator.rollback(&project, &servers, release).await?;
            print_report(&report)
        }
        "prune" => {
            let reports = state.coordinator.prune(&project, &servers).await?;
            print_json(&reports);
            Ok(())
        }
        "releases" => {
            let outcomes = state.fleet.releases(&servers).await;
            let listing: HashMap<String, serde_json::Value> = outcomes
                .into_iter()
                .map(|outcome| {
                    let value = match outcome.result {
                        Ok(releases) => serde_json::json!(releases),
                        Err(e) => serde_json::json!({ "error": e.summary() }),
                    };
                    (outcome.server_id.to_string(), value)
                })
                .collect();
            print_json(&listing);
            Ok(())
        }
        other => Err(DeployError::ValidationError(format!(
            "Unknown action '{}'. {}",
            other, USAGE
        ))),
    }
}

fn print_report(report: &DeploymentReport) -> Result<(), DeployError> {
    print_json(report);
    match report.status {
        DeploymentStatus::Success => {
            println!("{}", "success".green().bold());
            Ok(())
        }
        DeploymentStatus::Partial => {
            println!("{}", "partial".yellow().bold());
            Err(DeployError::Internal("some servers failed".to_string()))
        }
        DeploymentStatus::Failed => {
            println!("{}", "failed".red().bold());
            Err(DeployError::Internal("every server failed".to_string()))
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            error!("Failed to install signal handlers");
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return std::future::pending().await;
        }
        info!("Ctrl+C received, cancelling...");
    }
}
