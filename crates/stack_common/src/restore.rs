//! Restore orchestrator
//!
//! A strictly ordered state machine; every transition is fatal on
//! failure. The archive is opened and validated before any running
//! service is touched. The database is restored with only the database
//! service up, application state with only the application service up,
//! and the run finishes with the whole stack started and health-gated.
//!
//! On a fatal mid-run failure services stay exactly where the failed
//! transition left them, and the diagnostic says so; the operator
//! decides recovery. There is no auto-rollback.

use crate::artifact::{ArtifactRef, ArtifactStore, Manifest, Staging};
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::health::{wait_ready, DbReadyProbe, ReadinessProbe, WaitOutcome};
use crate::lock::RunLock;
use crate::runtime::{CopyDirection, ServiceRuntime, ServiceSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Named transitions of the restore state machine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RestorePhase {
    Opened,
    AllStopped,
    DbOnlyUp,
    DbRestored,
    DbStopped,
    AppStateRestored,
    AllUp,
    HealthVerified,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opened => "archive opened",
            Self::AllStopped => "all services stopped",
            Self::DbOnlyUp => "database running alone",
            Self::DbRestored => "database restored",
            Self::DbStopped => "database stopped",
            Self::AppStateRestored => "application state restored",
            Self::AllUp => "all services started",
            Self::HealthVerified => "health verified",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub artifact: ArtifactRef,
    pub app_state_restored: bool,
}

pub struct RestoreOrchestrator<'a, R: ServiceRuntime, P: ReadinessProbe> {
    config: &'a StackConfig,
    runtime: &'a R,
    app_probe: P,
}

impl<'a, R: ServiceRuntime, P: ReadinessProbe> RestoreOrchestrator<'a, R, P> {
    pub fn new(config: &'a StackConfig, runtime: &'a R, app_probe: P) -> Self {
        Self {
            config,
            runtime,
            app_probe,
        }
    }

    pub fn run(&mut self, artifact_path: &Path) -> Result<RestoreOutcome> {
        let _lock = RunLock::acquire(&self.config.backup_dir, "restore")?;

        let artifact = ArtifactRef::from_path(artifact_path)?;
        let store = ArtifactStore::new(&self.config.backup_dir, &self.config.backup_prefix);

        // Validate the archive before touching any running service.
        let (staging, manifest) = store.open(&artifact)?;
        self.phase(RestorePhase::Opened);

        match self.restore_from(&staging, &manifest) {
            Ok(app_state_restored) => Ok(RestoreOutcome {
                artifact,
                app_state_restored,
            }),
            Err(e) => {
                error!(
                    "❌  Restore failed ({}); services were left as the failed step put them. \
                     Inspect the service logs before restarting",
                    e
                );
                Err(e)
            }
        }
    }

    fn restore_from(&mut self, staging: &Staging, manifest: &Manifest) -> Result<bool> {
        let config = self.config;
        let creds = config.db_credentials();
        let interval = Duration::from_secs(config.probe_interval_secs);

        self.runtime.stop(ServiceSet::All)?;
        self.phase(RestorePhase::AllStopped);

        self.runtime
            .start(ServiceSet::Only(&[config.db_service.as_str()]))?;
        let mut db_probe = DbReadyProbe::new(self.runtime, creds.clone());
        match wait_ready(&mut db_probe, config.probe_max_attempts, interval) {
            WaitOutcome::Ready { .. } => self.phase(RestorePhase::DbOnlyUp),
            WaitOutcome::TimedOut { attempts } => {
                return Err(StackError::TimedOut {
                    subject: format!("database service '{}'", config.db_service),
                    attempts,
                });
            }
        }

        info!("🗄️  Restoring database '{}' from dump", config.db_name);
        self.runtime.exec_restore(&creds, &staging.dump_path())?;
        self.phase(RestorePhase::DbRestored);

        self.runtime
            .stop(ServiceSet::Only(&[config.db_service.as_str()]))?;
        self.phase(RestorePhase::DbStopped);

        let mut app_state_restored = false;
        if manifest.has_app_state {
            self.runtime
                .start(ServiceSet::Only(&[config.app_service.as_str()]))?;
            // Inbound copies are fatal: the archive declared this state.
            self.runtime.copy_state(
                &config.app_service,
                &config.app_data_path,
                CopyDirection::ToService,
                &staging.app_state_dir(),
            )?;
            self.runtime
                .stop(ServiceSet::Only(&[config.app_service.as_str()]))?;
            app_state_restored = true;
            self.phase(RestorePhase::AppStateRestored);
        } else {
            // Intentional degraded-but-successful outcome.
            warn!("⚠️  Archive carries no application state; restoring database only");
        }

        if manifest.has_worker_state {
            if let Some(worker) = &config.worker_service {
                self.runtime.start(ServiceSet::Only(&[worker.as_str()]))?;
                self.runtime.copy_state(
                    worker,
                    &config.worker_data_path,
                    CopyDirection::ToService,
                    &staging.worker_state_dir(),
                )?;
                self.runtime.stop(ServiceSet::Only(&[worker.as_str()]))?;
            } else {
                warn!("⚠️  Archive carries worker state but no WORKER_SERVICE is configured");
            }
        }

        self.runtime.start(ServiceSet::All)?;
        self.phase(RestorePhase::AllUp);

        match wait_ready(&mut self.app_probe, config.probe_max_attempts, interval) {
            WaitOutcome::Ready { .. } => {
                self.phase(RestorePhase::HealthVerified);
                info!("✅  Restore complete");
                Ok(app_state_restored)
            }
            WaitOutcome::TimedOut { attempts } => Err(StackError::TimedOut {
                subject: format!("application service '{}'", config.app_service),
                attempts,
            }),
        }
    }

    fn phase(&self, phase: RestorePhase) {
        info!("🔄  Restore: {}", phase);
    }
}
