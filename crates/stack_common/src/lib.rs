//! Stack Common - shared orchestration core for stackctl
//!
//! Everything that moves the managed stack between states lives here:
//! configuration, the service runtime boundary, health probing, the
//! artifact store, run locks, and the backup / restore / update
//! orchestrators. The CLI crate is a thin wiring layer on top.

pub mod artifact;
pub mod backup;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod restore;
pub mod runtime;
pub mod update;

pub use artifact::{ArtifactRef, ArtifactStore, Manifest, Staging};
pub use backup::{BackupOrchestrator, BackupOutcome};
pub use config::StackConfig;
pub use error::{Result, StackError};
pub use health::{wait_ready, ReadinessProbe, WaitOutcome};
pub use lock::RunLock;
pub use restore::{RestoreOrchestrator, RestoreOutcome, RestorePhase};
pub use runtime::{
    ComposeRuntime, CopyDirection, DbCredentials, ServiceRuntime, ServiceSet, ServiceState,
};
pub use update::{ConfirmGate, UpdateOrchestrator, UpdateOutcome, UpdateRequest};
