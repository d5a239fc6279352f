//! Backup orchestrator
//!
//! Produces one consistent artifact: database dump plus best-effort
//! application-state snapshots. The database must be running; a stopped
//! application degrades the run to a database-only backup instead of
//! failing it. Retention is swept after every successful commit.

use crate::artifact::{ArtifactRef, ArtifactStore, Manifest};
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::lock::RunLock;
use crate::runtime::{CopyDirection, ServiceRuntime};
use tracing::{info, warn};

#[derive(Debug)]
pub struct BackupOutcome {
    pub artifact: ArtifactRef,
    pub app_state_included: bool,
    pub worker_state_included: bool,
    /// Artifacts removed by the retention sweep.
    pub swept: usize,
}

pub struct BackupOrchestrator<'a, R: ServiceRuntime> {
    config: &'a StackConfig,
    runtime: &'a R,
    store: ArtifactStore,
}

impl<'a, R: ServiceRuntime> BackupOrchestrator<'a, R> {
    pub fn new(config: &'a StackConfig, runtime: &'a R) -> Self {
        let store = ArtifactStore::new(&config.backup_dir, &config.backup_prefix);
        Self {
            config,
            runtime,
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn run(&self) -> Result<BackupOutcome> {
        let _lock = RunLock::acquire(&self.config.backup_dir, "backup")?;
        self.run_locked()
    }

    /// The backup sequence without lock acquisition, for callers that
    /// already hold a broader lock (the update orchestrator).
    pub(crate) fn run_locked(&self) -> Result<BackupOutcome> {
        let config = self.config;
        let creds = config.db_credentials();

        // A backup with no database is meaningless.
        if !self.runtime.is_running(&config.db_service)? {
            return Err(StackError::PreconditionFailed(format!(
                "database service '{}' is not running; start it before backing up",
                config.db_service
            )));
        }

        let app_running = self.runtime.is_running(&config.app_service)?;
        if !app_running {
            warn!(
                "⚠️  Application service '{}' is not running; taking a database-only backup",
                config.app_service
            );
        }

        let staging = self.store.create(chrono::Local::now().naive_local())?;

        info!("🗄️  Dumping database '{}'", config.db_name);
        self.runtime.exec_dump(&creds, &staging.dump_path())?;

        // State copies are best-effort: a missed snapshot degrades the
        // artifact, it does not lose the dump.
        let mut app_state_included = false;
        if app_running {
            info!("📂  Snapshotting application state");
            match self.runtime.copy_state(
                &config.app_service,
                &config.app_data_path,
                CopyDirection::FromService,
                &staging.app_state_dir(),
            ) {
                Ok(()) => app_state_included = true,
                Err(e) => warn!("⚠️  Application state snapshot skipped: {}", e),
            }
        }

        // The worker runs or stops independently of the application;
        // its snapshot is gated on its own state.
        let mut worker_state_included = false;
        if let Some(worker) = &config.worker_service {
            if self.runtime.is_running(worker)? {
                match self.runtime.copy_state(
                    worker,
                    &config.worker_data_path,
                    CopyDirection::FromService,
                    &staging.worker_state_dir(),
                ) {
                    Ok(()) => worker_state_included = true,
                    Err(e) => warn!("⚠️  Worker state snapshot skipped: {}", e),
                }
            } else {
                warn!(
                    "⚠️  Worker service '{}' is not running; its state is not included",
                    worker
                );
            }
        }

        let manifest = Manifest {
            created_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            db_name: config.db_name.clone(),
            app_version: config.app_version.clone(),
            db_version: config.db_version.clone(),
            has_app_state: app_state_included,
            has_worker_state: worker_state_included,
        };
        let artifact = self.store.commit(staging, &manifest)?;

        let swept = self.store.apply_retention(
            config.retention_days,
            chrono::Local::now().naive_local(),
        )?;

        info!(
            "✅  Backup complete: {} ({} old artifact(s) swept)",
            artifact.file_name(),
            swept
        );
        Ok(BackupOutcome {
            artifact,
            app_state_included,
            worker_state_included,
            swept,
        })
    }
}
