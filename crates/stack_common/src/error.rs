//! Error taxonomy for stack orchestration
//!
//! Configuration and request-validation errors are raised before any
//! external mutation. Mid-run errors abort the current orchestrator run;
//! the only tolerated failures are the explicitly best-effort steps
//! (application-state backup copy, per-item retention deletions), which
//! log and continue instead of surfacing here.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StackError>;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// A required service was not in the expected state before a run.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The database dump facility returned a failure.
    #[error("database dump failed: {0}")]
    DumpFailed(String),

    /// The database restore facility returned a failure. Fatal to the
    /// enclosing restore run.
    #[error("database restore failed: {0}")]
    RestoreFailed(String),

    /// An artifact could not be extracted or is missing expected
    /// internal files.
    #[error("corrupt archive {}: {reason}", .path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// A readiness probe did not succeed within its attempt bound.
    #[error("{subject} not ready after {attempts} probe(s)")]
    TimedOut { subject: String, attempts: u32 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed caller input, caught before any side effect.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid persisted configuration, caught at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StackError {
    /// Wrap an I/O error with the operation that produced it.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
