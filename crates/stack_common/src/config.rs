//! Stack configuration
//!
//! The stack is described by a single `KEY=VALUE` file (shared with the
//! container orchestration layer, so the format is fixed). It is read
//! once at process start into an explicit [`StackConfig`]; orchestration
//! logic never looks at the ambient environment.
//!
//! v0.8.0: version rewrites go through a validated temp-file + rename,
//! never an in-place mutation of a file that may be concurrently read.

use crate::error::{Result, StackError};
use crate::runtime::DbCredentials;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Recommended minimum length for the application encryption key.
pub const MIN_ENCRYPTION_KEY_CHARS: usize = 32;

const REQUIRED_KEYS: &[&str] = &[
    "APP_VERSION",
    "PROTOCOL",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "ENCRYPTION_KEY",
    "TIMEZONE",
];

/// Validated stack configuration, constructed once at process start and
/// passed by reference into each orchestrator.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Path of the file this configuration was loaded from.
    pub source: PathBuf,

    pub app_version: String,
    pub db_version: String,
    pub protocol: String,
    pub host: String,
    pub app_port: u16,

    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub encryption_key: String,
    pub timezone: String,

    /// Compose service names.
    pub app_service: String,
    pub db_service: String,
    /// Optional secondary managed service (e.g. a worker) whose state is
    /// snapshotted best-effort alongside the application's.
    pub worker_service: Option<String>,

    /// In-container state directories, copied into backup artifacts.
    pub app_data_path: String,
    pub worker_data_path: String,

    pub compose_file: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_prefix: String,
    pub retention_days: i64,

    /// Readiness probing bounds (fixed interval, no backoff).
    pub probe_max_attempts: u32,
    pub probe_interval_secs: u64,
}

impl StackConfig {
    /// Load and validate configuration from a `KEY=VALUE` file.
    ///
    /// Missing required keys abort with `Configuration` before any
    /// orchestration step runs.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            StackError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let values = parse_env_file(&raw);

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .filter(|k| !values.contains_key(**k))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(StackError::Configuration(format!(
                "{} is missing required key(s): {}",
                path.display(),
                missing.join(", ")
            )));
        }

        let get = |key: &str| values.get(key).cloned().unwrap_or_default();
        let get_or = |key: &str, default: &str| {
            values
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let encryption_key = get("ENCRYPTION_KEY");
        if encryption_key.chars().count() < MIN_ENCRYPTION_KEY_CHARS {
            warn!(
                "⚠️  ENCRYPTION_KEY is shorter than the recommended {} characters",
                MIN_ENCRYPTION_KEY_CHARS
            );
        }

        let retention_days: i64 = get_or("RETENTION_DAYS", "7").parse().map_err(|_| {
            StackError::Configuration("RETENTION_DAYS must be a whole number of days".into())
        })?;
        if retention_days < 1 {
            return Err(StackError::Configuration(
                "RETENTION_DAYS must be at least 1".into(),
            ));
        }

        let app_port: u16 = get_or("APP_PORT", "5678")
            .parse()
            .map_err(|_| StackError::Configuration("APP_PORT must be a port number".into()))?;

        let probe_max_attempts: u32 = get_or("PROBE_MAX_ATTEMPTS", "30").parse().map_err(|_| {
            StackError::Configuration("PROBE_MAX_ATTEMPTS must be a positive number".into())
        })?;
        let probe_interval_secs: u64 = get_or("PROBE_INTERVAL_SECS", "2").parse().map_err(|_| {
            StackError::Configuration("PROBE_INTERVAL_SECS must be a number of seconds".into())
        })?;

        let worker_service = values
            .get("WORKER_SERVICE")
            .filter(|v| !v.is_empty())
            .cloned();

        Ok(Self {
            source: path.to_path_buf(),
            app_version: get("APP_VERSION"),
            db_version: get_or("DB_VERSION", "16"),
            protocol: get("PROTOCOL"),
            host: get_or("HOST", "localhost"),
            app_port,
            db_name: get("DB_NAME"),
            db_user: get("DB_USER"),
            db_password: get("DB_PASSWORD"),
            encryption_key,
            timezone: get("TIMEZONE"),
            app_service: get_or("APP_SERVICE", "app"),
            db_service: get_or("DB_SERVICE", "db"),
            worker_service,
            app_data_path: get_or("APP_DATA_PATH", "/data"),
            worker_data_path: get_or("WORKER_DATA_PATH", "/data"),
            compose_file: PathBuf::from(get_or("COMPOSE_FILE", "docker-compose.yml")),
            backup_dir: PathBuf::from(get_or("BACKUP_DIR", "backups")),
            backup_prefix: get_or("BACKUP_PREFIX", "backup"),
            retention_days,
            probe_max_attempts,
            probe_interval_secs,
        })
    }

    /// Health endpoint of the application service.
    pub fn app_health_url(&self) -> String {
        format!(
            "{}://{}:{}/healthz",
            self.protocol, self.host, self.app_port
        )
    }

    /// Credentials for the database dump/restore facility.
    pub fn db_credentials(&self) -> DbCredentials {
        DbCredentials {
            service: self.db_service.clone(),
            name: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
        }
    }

    /// Rewrite `APP_VERSION` / `DB_VERSION` in the configuration file.
    ///
    /// Produces a new file next to the original and renames it into
    /// place, preserving unrelated lines and comments. Keys absent from
    /// the file are appended. A `None` target leaves the key untouched.
    pub fn rewrite_versions(&self, app: Option<&str>, db: Option<&str>) -> Result<()> {
        let raw = fs::read_to_string(&self.source)
            .map_err(|e| StackError::io(format!("reading {}", self.source.display()), e))?;

        let mut out = String::with_capacity(raw.len());
        let mut wrote_app = app.is_none();
        let mut wrote_db = db.is_none();

        for line in raw.lines() {
            let key = line.split('=').next().map(str::trim).unwrap_or("");
            let replaced = match key {
                "APP_VERSION" if app.is_some() => {
                    wrote_app = true;
                    Some(format!("APP_VERSION={}", app.unwrap_or_default()))
                }
                "DB_VERSION" if db.is_some() => {
                    wrote_db = true;
                    Some(format!("DB_VERSION={}", db.unwrap_or_default()))
                }
                _ => None,
            };
            out.push_str(replaced.as_deref().unwrap_or(line));
            out.push('\n');
        }
        if !wrote_app {
            if let Some(v) = app {
                out.push_str(&format!("APP_VERSION={}\n", v));
            }
        }
        if !wrote_db {
            if let Some(v) = db {
                out.push_str(&format!("DB_VERSION={}\n", v));
            }
        }

        // Suffix is appended, not substituted: `stack.env` becomes
        // `stack.env.tmp`, never `stack.tmp`.
        let mut tmp = self.source.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &out)
            .map_err(|e| StackError::io(format!("writing {}", tmp.display()), e))?;

        // The rewritten file must still load before it replaces the original.
        StackConfig::load(&tmp).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StackError::Configuration(format!("rewritten configuration is invalid: {}", e))
        })?;

        fs::rename(&tmp, &self.source)
            .map_err(|e| StackError::io(format!("replacing {}", self.source.display()), e))
    }
}

/// Parse a `KEY=VALUE` file: blank lines and `#` comments skipped,
/// optional single or double quotes stripped from values.
fn parse_env_file(raw: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        values.insert(key.to_string(), value.to_string());
    }
    values
}
