//! Update orchestrator
//!
//! Version changes always ride behind a pre-update backup. The stored
//! version specification is rewritten only after that backup exists; a
//! database major-version jump is a breaking-change path that must be
//! confirmed by the operator before any image is pulled. A failed
//! post-update health check is reported with the pre-update artifact
//! named; recovery is the operator's call, never an auto-rollback.

use crate::artifact::ArtifactRef;
use crate::backup::BackupOrchestrator;
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::health::{wait_ready, DbReadyProbe, ReadinessProbe, WaitOutcome};
use crate::lock::RunLock;
use crate::runtime::{ServiceRuntime, ServiceSet};
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::{error, info, warn};

/// Requested target versions; unset means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub app_version: Option<String>,
    pub db_version: Option<String>,
}

impl UpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.app_version.is_none() && self.db_version.is_none()
    }
}

/// Operator confirmation for the breaking-change path.
pub trait ConfirmGate {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Interactive gate reading a `y`/`yes` answer from stdin.
pub struct StdinGate;

impl ConfirmGate for StdinGate {
    fn confirm(&mut self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Gate that approves everything, for `--yes` scripted runs.
pub struct AutoApproveGate;

impl ConfirmGate for AutoApproveGate {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    /// Versions rewritten, services restarted, health verified.
    Updated {
        backup: ArtifactRef,
        app_version: Option<String>,
        db_version: Option<String>,
    },
    /// Operator declined the breaking-change gate. The version
    /// specification is already rewritten; services were not restarted.
    Declined { backup: ArtifactRef },
}

pub struct UpdateOrchestrator<'a, R: ServiceRuntime, P: ReadinessProbe, G: ConfirmGate> {
    config: &'a StackConfig,
    runtime: &'a R,
    app_probe: P,
    gate: G,
}

impl<'a, R: ServiceRuntime, P: ReadinessProbe, G: ConfirmGate> UpdateOrchestrator<'a, R, P, G> {
    pub fn new(config: &'a StackConfig, runtime: &'a R, app_probe: P, gate: G) -> Self {
        Self {
            config,
            runtime,
            app_probe,
            gate,
        }
    }

    pub fn run(&mut self, request: &UpdateRequest) -> Result<UpdateOutcome> {
        // Rejected before any side effect, lock included.
        if request.is_empty() {
            return Err(StackError::InvalidRequest(
                "update needs --app-version and/or --db-version".into(),
            ));
        }

        let _lock = RunLock::acquire(&self.config.backup_dir, "update")?;
        let config = self.config;

        // Explicit argument beats configured default; unset stays put.
        let app_target = request.app_version.as_deref();
        let db_target = request.db_version.as_deref();
        let app_change = app_target.filter(|v| *v != config.app_version);
        let db_change = db_target.filter(|v| *v != config.db_version);
        if app_change.is_none() && db_change.is_none() {
            info!("📋  Requested versions match the stored configuration; refreshing anyway");
        }

        info!("💾  Taking pre-update backup");
        let backup = BackupOrchestrator::new(config, self.runtime).run_locked()?;
        let backup = backup.artifact;

        // Only after the safety net exists is the stored version
        // specification rewritten.
        config.rewrite_versions(app_change, db_change)?;
        if let Some(v) = app_change {
            info!("📝  APP_VERSION {} -> {}", config.app_version, v);
        }
        if let Some(v) = db_change {
            info!("📝  DB_VERSION {} -> {}", config.db_version, v);
        }

        if let Some(target) = db_change {
            if is_breaking(&config.db_version, target) {
                let prompt = format!(
                    "Database major version change {} -> {} may require manual migration. Continue?",
                    config.db_version, target
                );
                if !self.gate.confirm(&prompt) {
                    warn!(
                        "⚠️  Update aborted at the confirmation gate; versions are rewritten in {} \
                         but services were not restarted (revert the file or re-run to proceed)",
                        config.source.display()
                    );
                    return Ok(UpdateOutcome::Declined { backup });
                }
            }
        }

        info!("⬇️  Pulling images");
        self.runtime.pull_images()?;
        info!("🔄  Restarting services");
        if let Err(e) = self.runtime.stop(ServiceSet::All) {
            error!("❌  Restart failed while stopping; services may be partially stopped");
            return Err(e);
        }
        if let Err(e) = self.runtime.start(ServiceSet::All) {
            error!(
                "❌  Restart failed while starting; services may be stopped. \
                 Pre-update backup: {}",
                backup.path.display()
            );
            return Err(e);
        }

        let interval = Duration::from_secs(config.probe_interval_secs);
        let app_wait = wait_ready(&mut self.app_probe, config.probe_max_attempts, interval);
        let mut db_probe = DbReadyProbe::new(self.runtime, config.db_credentials());
        let db_wait = wait_ready(&mut db_probe, config.probe_max_attempts, interval);

        for (subject, outcome) in [
            (format!("application service '{}'", config.app_service), app_wait),
            (format!("database service '{}'", config.db_service), db_wait),
        ] {
            if let WaitOutcome::TimedOut { attempts } = outcome {
                error!(
                    "❌  {} did not become ready after the update; NOT rolling back \
                     automatically. Pre-update backup: {}",
                    subject,
                    backup.path.display()
                );
                return Err(StackError::TimedOut { subject, attempts });
            }
        }

        info!("✅  Update complete and health-verified");
        Ok(UpdateOutcome::Updated {
            backup,
            app_version: app_change.map(String::from),
            db_version: db_change.map(String::from),
        })
    }
}

/// Leading numeric component of a version string ("16.4" -> 16,
/// "15-bookworm" -> 15).
fn major(version: &str) -> Option<u32> {
    let digits: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// A database change is breaking when the major versions differ. If
/// either side has no parseable major, any difference is treated as
/// breaking.
fn is_breaking(current: &str, target: &str) -> bool {
    match (major(current), major(target)) {
        (Some(a), Some(b)) => a != b,
        _ => current != target,
    }
}
