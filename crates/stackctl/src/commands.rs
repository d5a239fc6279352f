//! Command implementations
//!
//! Each command loads the configuration once, builds the compose
//! runtime and probes, runs the matching orchestrator, and prints a
//! short human-readable summary. Errors bubble to `main` for exit-code
//! mapping.

use owo_colors::OwoColorize;
use stack_common::{
    update::{AutoApproveGate, StdinGate},
    ArtifactStore, BackupOrchestrator, ComposeRuntime, ReadinessProbe, RestoreOrchestrator,
    Result, ServiceState, ServiceRuntime, StackConfig, UpdateOrchestrator, UpdateOutcome,
    UpdateRequest,
};
use stack_common::health::{DbReadyProbe, HttpHealthProbe};
use std::path::Path;
use tracing::info;

fn load(config_path: &Path) -> Result<(StackConfig, ComposeRuntime)> {
    info!("🔧  Using configuration {}", config_path.display());
    let config = StackConfig::load(config_path)?;
    let runtime = ComposeRuntime::new(&config.compose_file);
    Ok((config, runtime))
}

pub fn backup(config_path: &Path) -> Result<()> {
    let (config, runtime) = load(config_path)?;
    let outcome = BackupOrchestrator::new(&config, &runtime).run()?;

    println!(
        "{} {}",
        "Backup written:".green(),
        outcome.artifact.path.display()
    );
    if !outcome.app_state_included {
        println!(
            "{}",
            "Note: database-only backup (application state not included)".yellow()
        );
    }
    Ok(())
}

pub fn restore(config_path: &Path, artifact: &Path) -> Result<()> {
    let (config, runtime) = load(config_path)?;
    let probe = HttpHealthProbe::new(config.app_health_url());
    let outcome = RestoreOrchestrator::new(&config, &runtime, probe).run(artifact)?;

    println!(
        "{} {}",
        "Restored from".green(),
        outcome.artifact.file_name()
    );
    if !outcome.app_state_restored {
        println!(
            "{}",
            "Note: archive carried no application state; database restored only".yellow()
        );
    }
    Ok(())
}

pub fn update(
    config_path: &Path,
    app_version: Option<String>,
    db_version: Option<String>,
    yes: bool,
) -> Result<()> {
    // Rejected before the configuration is even read: no side effects.
    if app_version.is_none() && db_version.is_none() {
        return Err(stack_common::StackError::InvalidRequest(
            "update needs --app-version and/or --db-version (see stackctl update --help)".into(),
        ));
    }

    let (config, runtime) = load(config_path)?;
    let probe = HttpHealthProbe::new(config.app_health_url());
    let request = UpdateRequest {
        app_version,
        db_version,
    };

    let outcome = if yes {
        UpdateOrchestrator::new(&config, &runtime, probe, AutoApproveGate).run(&request)?
    } else {
        UpdateOrchestrator::new(&config, &runtime, probe, StdinGate).run(&request)?
    };

    match outcome {
        UpdateOutcome::Updated {
            backup,
            app_version,
            db_version,
        } => {
            if let Some(v) = app_version {
                println!("{} application -> {}", "Updated".green(), v);
            }
            if let Some(v) = db_version {
                println!("{} database -> {}", "Updated".green(), v);
            }
            println!("Pre-update backup: {}", backup.path.display());
        }
        UpdateOutcome::Declined { backup } => {
            println!(
                "{}",
                "Update stopped at the confirmation gate; services were not restarted".yellow()
            );
            println!("Pre-update backup: {}", backup.path.display());
        }
    }
    Ok(())
}

pub fn status(config_path: &Path) -> Result<()> {
    let (config, runtime) = load(config_path)?;

    let mut app_probe = HttpHealthProbe::new(config.app_health_url());
    let app_state = observe(&runtime, &config.app_service, &mut app_probe)?;

    let mut db_probe = DbReadyProbe::new(&runtime, config.db_credentials());
    let db_state = observe(&runtime, &config.db_service, &mut db_probe)?;

    println!("Stack configuration: {}", config.source.display());
    println!("  application {} (version {})", paint(app_state), config.app_version);
    println!("  database    {} (version {})", paint(db_state), config.db_version);
    if let Some(worker) = &config.worker_service {
        let running = runtime.is_running(worker)?;
        let state = if running {
            ServiceState::Ready
        } else {
            ServiceState::Stopped
        };
        println!("  worker      {}", paint(state));
    }
    println!("  timezone    {}", config.timezone);
    Ok(())
}

fn observe<R: ServiceRuntime>(
    runtime: &R,
    service: &str,
    probe: &mut dyn ReadinessProbe,
) -> Result<ServiceState> {
    if !runtime.is_running(service)? {
        return Ok(ServiceState::Stopped);
    }
    Ok(if probe.check() {
        ServiceState::Ready
    } else {
        ServiceState::Unhealthy
    })
}

fn paint(state: ServiceState) -> String {
    match state {
        ServiceState::Ready => state.as_str().green().to_string(),
        ServiceState::Stopped => state.as_str().red().to_string(),
        ServiceState::Starting | ServiceState::Unhealthy => state.as_str().yellow().to_string(),
    }
}

pub fn list(config_path: &Path) -> Result<()> {
    info!("🔧  Using configuration {}", config_path.display());
    let config = StackConfig::load(config_path)?;
    let store = ArtifactStore::new(&config.backup_dir, &config.backup_prefix);
    let artifacts = store.list()?;

    if artifacts.is_empty() {
        println!("No artifacts in {}", store.dir().display());
        return Ok(());
    }
    let now = chrono::Local::now().naive_local();
    for artifact in artifacts {
        let age_days = (now - artifact.created).num_days();
        println!("{}  ({} day(s) old)", artifact.file_name(), age_days);
    }
    Ok(())
}
