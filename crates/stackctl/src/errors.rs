//! Exit codes for stackctl
//!
//! Sysexits-style codes so schedulers can tell failure classes apart.

use stack_common::StackError;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general orchestration failures.
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code for malformed requests (EX_USAGE).
pub const EXIT_INVALID_REQUEST: i32 = 64;

/// Exit code for corrupt or unreadable artifacts (EX_DATAERR).
pub const EXIT_CORRUPT_ARCHIVE: i32 = 65;

/// Exit code when a readiness bound was exhausted (EX_UNAVAILABLE).
pub const EXIT_TIMED_OUT: i32 = 69;

/// Exit code when a required service was in the wrong state, or
/// another run holds the lock (EX_TEMPFAIL).
pub const EXIT_PRECONDITION: i32 = 75;

/// Exit code for configuration errors (EX_CONFIG).
pub const EXIT_CONFIG_ERROR: i32 = 78;

/// Map an orchestration error to its process exit code.
pub fn exit_code_for(err: &StackError) -> i32 {
    match err {
        StackError::InvalidRequest(_) => EXIT_INVALID_REQUEST,
        StackError::CorruptArchive { .. } => EXIT_CORRUPT_ARCHIVE,
        StackError::TimedOut { .. } => EXIT_TIMED_OUT,
        StackError::PreconditionFailed(_) => EXIT_PRECONDITION,
        StackError::Configuration(_) => EXIT_CONFIG_ERROR,
        StackError::DumpFailed(_) | StackError::RestoreFailed(_) | StackError::Io { .. } => {
            EXIT_GENERAL_ERROR
        }
    }
}
