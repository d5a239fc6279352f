//! Service runtime boundary
//!
//! The orchestration boundary the core talks to: start/stop named
//! services, point-in-time "is running" queries, dump/restore execution
//! inside the database service, state-directory copies, and image pulls.
//! [`ServiceRuntime`] is the narrow contract; [`ComposeRuntime`] is the
//! production implementation shelling out to `docker compose`.
//!
//! Command execution is a single structured layer: real exit code,
//! stdout, stderr, duration, no reinterpretation of errors.

use crate::error::{Result, StackError};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::debug;

/// Maximum captured output per stream.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Observed state of a managed service, derived on demand and never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Ready,
    Unhealthy,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Which services a start/stop action addresses.
#[derive(Debug, Clone, Copy)]
pub enum ServiceSet<'a> {
    All,
    Only(&'a [&'a str]),
}

/// Direction of a state-directory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Service state directory -> local path (backup).
    FromService,
    /// Local path -> service state directory (restore).
    ToService,
}

/// Credentials for the database dump/restore facility.
#[derive(Debug, Clone)]
pub struct DbCredentials {
    /// Compose service name of the database.
    pub service: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// The orchestration boundary contract.
///
/// Start and stop are idempotent: starting a running service or
/// stopping a stopped one succeeds without error.
pub trait ServiceRuntime {
    fn start(&self, services: ServiceSet<'_>) -> Result<()>;
    fn stop(&self, services: ServiceSet<'_>) -> Result<()>;
    fn is_running(&self, service: &str) -> Result<bool>;

    /// Dump the database in its custom compressed format to `out`.
    /// The stream is opaque to the orchestrators.
    fn exec_dump(&self, creds: &DbCredentials, out: &Path) -> Result<()>;

    /// Drop and recreate the target database, then restore it from
    /// `dump`, ignoring ownership and privilege metadata.
    fn exec_restore(&self, creds: &DbCredentials, dump: &Path) -> Result<()>;

    /// Copy a service's persistent state directory to or from `local`.
    fn copy_state(
        &self,
        service: &str,
        remote_path: &str,
        direction: CopyDirection,
        local: &Path,
    ) -> Result<()>;

    /// One-shot connection-readiness check against the database.
    fn db_ready(&self, creds: &DbCredentials) -> Result<bool>;

    /// Pull or refresh images for the configured service versions.
    fn pull_images(&self) -> Result<()>;
}

/// Structured result of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First stderr line, for diagnostics that name the failed step.
    pub fn stderr_excerpt(&self) -> String {
        self.stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("(no stderr)")
            .to_string()
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > MAX_OUTPUT_BYTES {
        let mut end = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…[truncated]", &text[..end])
    } else {
        text.into_owned()
    }
}

/// `docker compose` implementation of the boundary.
pub struct ComposeRuntime {
    compose_file: PathBuf,
}

impl ComposeRuntime {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
        }
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.display().to_string(),
        ]
    }

    fn run(&self, args: &[String]) -> Result<CommandResult> {
        let start = Instant::now();
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| StackError::io(format!("running docker {}", args.join(" ")), e))?;

        let result = CommandResult {
            command: format!("docker {}", args.join(" ")),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&output.stdout),
            stderr: truncate_output(&output.stderr),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            command = %result.command,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "external command finished"
        );
        Ok(result)
    }

    fn compose(&self, extra: &[&str]) -> Result<CommandResult> {
        let mut args = self.base_args();
        args.extend(extra.iter().map(|s| s.to_string()));
        self.run(&args)
    }

    /// `docker compose exec -T` in the database service with the
    /// password supplied through the environment, stdout and stdin
    /// optionally redirected to files.
    fn db_exec(
        &self,
        creds: &DbCredentials,
        argv: &[&str],
        stdout_to: Option<&Path>,
        stdin_from: Option<&Path>,
    ) -> Result<CommandResult> {
        let start = Instant::now();
        let mut args = self.base_args();
        args.extend([
            "exec".to_string(),
            "-T".to_string(),
            "-e".to_string(),
            format!("PGPASSWORD={}", creds.password),
            creds.service.clone(),
        ]);
        args.extend(argv.iter().map(|s| s.to_string()));

        let mut cmd = Command::new("docker");
        cmd.args(&args).stderr(Stdio::piped());

        match stdout_to {
            Some(path) => {
                let file = File::create(path)
                    .map_err(|e| StackError::io(format!("creating {}", path.display()), e))?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }
        match stdin_from {
            Some(path) => {
                let file = File::open(path)
                    .map_err(|e| StackError::io(format!("opening {}", path.display()), e))?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| StackError::io(format!("spawning docker compose exec {}", argv[0]), e))?;
        let output = child
            .wait_with_output()
            .map_err(|e| StackError::io(format!("waiting for {}", argv[0]), e))?;

        Ok(CommandResult {
            command: format!("docker compose exec {} {}", creds.service, argv.join(" ")),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&output.stdout),
            stderr: truncate_output(&output.stderr),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl ServiceRuntime for ComposeRuntime {
    fn start(&self, services: ServiceSet<'_>) -> Result<()> {
        // `up -d` is a no-op for services already running.
        let mut extra = vec!["up", "-d"];
        if let ServiceSet::Only(names) = services {
            extra.extend(names);
        }
        let result = self.compose(&extra)?;
        if result.success() {
            Ok(())
        } else {
            Err(StackError::PreconditionFailed(format!(
                "starting services failed: {}",
                result.stderr_excerpt()
            )))
        }
    }

    fn stop(&self, services: ServiceSet<'_>) -> Result<()> {
        let mut extra = vec!["stop"];
        if let ServiceSet::Only(names) = services {
            extra.extend(names);
        }
        let result = self.compose(&extra)?;
        if result.success() {
            Ok(())
        } else {
            Err(StackError::PreconditionFailed(format!(
                "stopping services failed: {}",
                result.stderr_excerpt()
            )))
        }
    }

    fn is_running(&self, service: &str) -> Result<bool> {
        let result = self.compose(&["ps", "--services", "--filter", "status=running"])?;
        if !result.success() {
            return Err(StackError::PreconditionFailed(format!(
                "querying running services failed: {}",
                result.stderr_excerpt()
            )));
        }
        Ok(result.stdout.lines().any(|line| line.trim() == service))
    }

    fn exec_dump(&self, creds: &DbCredentials, out: &Path) -> Result<()> {
        let result = self.db_exec(
            creds,
            &[
                "pg_dump",
                "-U",
                &creds.user,
                "-d",
                &creds.name,
                "--format=custom",
                "--compress=6",
            ],
            Some(out),
            None,
        )?;
        if result.success() {
            Ok(())
        } else {
            Err(StackError::DumpFailed(format!(
                "pg_dump exited with {}: {}",
                result.exit_code,
                result.stderr_excerpt()
            )))
        }
    }

    fn exec_restore(&self, creds: &DbCredentials, dump: &Path) -> Result<()> {
        // Drop + recreate so the restore starts from a clean database.
        let drop = self.db_exec(
            creds,
            &["dropdb", "-U", &creds.user, "--if-exists", &creds.name],
            None,
            None,
        )?;
        if !drop.success() {
            return Err(StackError::RestoreFailed(format!(
                "dropdb exited with {}: {}",
                drop.exit_code,
                drop.stderr_excerpt()
            )));
        }

        let create = self.db_exec(
            creds,
            &["createdb", "-U", &creds.user, &creds.name],
            None,
            None,
        )?;
        if !create.success() {
            return Err(StackError::RestoreFailed(format!(
                "createdb exited with {}: {}",
                create.exit_code,
                create.stderr_excerpt()
            )));
        }

        // Ownership and privilege metadata is skipped so the dump
        // restores across differently-provisioned environments.
        let restore = self.db_exec(
            creds,
            &[
                "pg_restore",
                "-U",
                &creds.user,
                "-d",
                &creds.name,
                "--no-owner",
                "--no-privileges",
            ],
            None,
            Some(dump),
        )?;
        if restore.success() {
            Ok(())
        } else {
            Err(StackError::RestoreFailed(format!(
                "pg_restore exited with {}: {}",
                restore.exit_code,
                restore.stderr_excerpt()
            )))
        }
    }

    fn copy_state(
        &self,
        service: &str,
        remote_path: &str,
        direction: CopyDirection,
        local: &Path,
    ) -> Result<()> {
        let remote = format!("{}:{}", service, remote_path);
        let local_str = local.display().to_string();
        let (src, dst) = match direction {
            CopyDirection::FromService => (remote.as_str(), local_str.as_str()),
            CopyDirection::ToService => (local_str.as_str(), remote.as_str()),
        };
        let result = self.compose(&["cp", src, dst])?;
        if result.success() {
            Ok(())
        } else {
            Err(StackError::io(
                format!("copying state {} -> {}", src, dst),
                std::io::Error::other(result.stderr_excerpt()),
            ))
        }
    }

    fn db_ready(&self, creds: &DbCredentials) -> Result<bool> {
        let result = self.db_exec(
            creds,
            &["pg_isready", "-U", &creds.user, "-d", &creds.name],
            None,
            None,
        )?;
        Ok(result.success())
    }

    fn pull_images(&self) -> Result<()> {
        let result = self.compose(&["pull"])?;
        if result.success() {
            Ok(())
        } else {
            Err(StackError::io(
                "pulling images".to_string(),
                std::io::Error::other(result.stderr_excerpt()),
            ))
        }
    }
}
