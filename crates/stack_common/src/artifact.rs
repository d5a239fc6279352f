//! Backup artifact store
//!
//! One artifact is one `<prefix>_<YYYYMMDD_HHMMSS>.tar.gz` in the store
//! directory, containing `manifest.json`, `db.dump`, and optional state
//! snapshots. The naming pattern is load-bearing: existing archives on
//! disk were written by earlier harness generations and the retention
//! sweep matches on it, so it must not change.
//!
//! Commit is atomic: contents are staged in a TempDir, compressed to a
//! hidden partial file in the store, and renamed into place only on
//! full success. A partial artifact never sits at the final path.

use crate::error::{Result, StackError};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MANIFEST_NAME: &str = "manifest.json";
const DUMP_NAME: &str = "db.dump";
const APP_STATE_DIR: &str = "app_data";
const WORKER_STATE_DIR: &str = "worker_data";

/// What an artifact declares about its own contents. Restore trusts the
/// manifest, not directory listings, to decide whether state snapshots
/// are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: String,
    pub tool_version: String,
    pub db_name: String,
    pub app_version: String,
    pub db_version: String,
    pub has_app_state: bool,
    #[serde(default)]
    pub has_worker_state: bool,
}

/// A committed artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub created: NaiveDateTime,
}

impl ArtifactRef {
    /// Interpret an existing file as an artifact. The file name must
    /// match the naming convention; the timestamp is taken from it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StackError::InvalidRequest(format!("bad path {}", path.display())))?;
        let created = parse_timestamp(name).ok_or_else(|| {
            StackError::InvalidRequest(format!(
                "{} does not match the <prefix>_<YYYYMMDD_HHMMSS>{} naming convention",
                name, ARCHIVE_SUFFIX
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            created,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Extract the timestamp from `<anything>_<YYYYMMDD_HHMMSS>.tar.gz`.
fn parse_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
    // The stamp is the last two underscore-separated fields.
    let mut parts: Vec<&str> = stem.rsplitn(3, '_').collect();
    if parts.len() < 3 {
        return None;
    }
    parts.truncate(2);
    let stamp = format!("{}_{}", parts[1], parts[0]);
    NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).ok()
}

/// Staging area for an artifact being written or read. Exclusively
/// owned by the in-flight backup or restore run; the backing TempDir is
/// removed on drop, on every exit path.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    created: NaiveDateTime,
}

impl Staging {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    pub fn dump_path(&self) -> PathBuf {
        self.dir.path().join(DUMP_NAME)
    }

    pub fn app_state_dir(&self) -> PathBuf {
        self.dir.path().join(APP_STATE_DIR)
    }

    pub fn worker_state_dir(&self) -> PathBuf {
        self.dir.path().join(WORKER_STATE_DIR)
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.path().join(MANIFEST_NAME)
    }
}

/// The on-disk artifact store: creation, naming, compression, listing,
/// extraction, and age-based retention.
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_name(&self, created: NaiveDateTime) -> String {
        format!(
            "{}_{}{}",
            self.prefix,
            created.format(TIMESTAMP_FORMAT),
            ARCHIVE_SUFFIX
        )
    }

    /// Allocate an isolated staging area for a new artifact.
    pub fn create(&self, created: NaiveDateTime) -> Result<Staging> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| StackError::io(format!("creating {}", self.dir.display()), e))?;
        let dir = TempDir::new_in(&self.dir)
            .map_err(|e| StackError::io("allocating staging area", e))?;
        Ok(Staging { dir, created })
    }

    /// Compress the staging area into its final archive.
    ///
    /// The staging area is discarded on return, success or failure; on
    /// failure no partial file remains at the final path.
    pub fn commit(&self, staging: Staging, manifest: &Manifest) -> Result<ArtifactRef> {
        let manifest_file = File::create(staging.manifest_path())
            .map_err(|e| StackError::io("writing manifest", e))?;
        serde_json::to_writer_pretty(manifest_file, manifest)
            .map_err(|e| StackError::io("serializing manifest", std::io::Error::other(e)))?;

        let name = self.archive_name(staging.created());
        let final_path = self.dir.join(&name);
        let partial_path = self.dir.join(format!(".{}.partial", name));

        let packed = pack(staging.path(), &partial_path);
        if let Err(e) = packed {
            let _ = fs::remove_file(&partial_path);
            return Err(e);
        }

        fs::rename(&partial_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&partial_path);
            StackError::io(format!("publishing {}", final_path.display()), e)
        })?;

        info!("📦  Committed artifact {}", name);
        Ok(ArtifactRef {
            path: final_path,
            created: staging.created(),
        })
        // staging TempDir dropped here
    }

    /// All artifacts in the store matching the naming convention,
    /// newest first. Unrelated files are ignored.
    pub fn list(&self) -> Result<Vec<ArtifactRef>> {
        let mut artifacts = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => return Err(StackError::io(format!("listing {}", self.dir.display()), e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| StackError::io("reading store entry", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&format!("{}_", self.prefix)) {
                continue;
            }
            if let Some(created) = parse_timestamp(name) {
                artifacts.push(ArtifactRef {
                    path: entry.path(),
                    created,
                });
            }
        }
        artifacts.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(artifacts)
    }

    /// Delete every artifact older than `max_age_days`, measured from
    /// `now` against the timestamp in the file name. Each deletion is
    /// independent: a failed removal is logged and the sweep continues.
    /// Returns the number of artifacts removed.
    pub fn apply_retention(&self, max_age_days: i64, now: NaiveDateTime) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(max_age_days);
        let mut removed = 0;
        for artifact in self.list()? {
            if artifact.created >= cutoff {
                continue;
            }
            match fs::remove_file(&artifact.path) {
                Ok(()) => {
                    info!("🧹  Retention removed {}", artifact.file_name());
                    removed += 1;
                }
                Err(e) => {
                    warn!(
                        "⚠️  Retention could not remove {}: {}",
                        artifact.file_name(),
                        e
                    );
                }
            }
        }
        Ok(removed)
    }

    /// Extract an artifact back into a staging area, inverse of
    /// `commit`. Fails with `CorruptArchive` if extraction fails or the
    /// expected internal files are absent.
    pub fn open(&self, artifact: &ArtifactRef) -> Result<(Staging, Manifest)> {
        let corrupt = |reason: String| StackError::CorruptArchive {
            path: artifact.path.clone(),
            reason,
        };

        let staging = self.create(artifact.created)?;

        let file = File::open(&artifact.path)
            .map_err(|e| corrupt(format!("cannot open archive: {}", e)))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .unpack(staging.path())
            .map_err(|e| corrupt(format!("extraction failed: {}", e)))?;

        if !staging.dump_path().is_file() {
            return Err(corrupt(format!("missing {}", DUMP_NAME)));
        }
        let manifest_file = File::open(staging.manifest_path())
            .map_err(|_| corrupt(format!("missing {}", MANIFEST_NAME)))?;
        let manifest: Manifest = serde_json::from_reader(manifest_file)
            .map_err(|e| corrupt(format!("unreadable manifest: {}", e)))?;

        Ok((staging, manifest))
    }
}

/// Build `dst` as a gzip-compressed tar of `src`'s contents and fsync
/// it before returning.
fn pack(src: &Path, dst: &Path) -> Result<()> {
    let file =
        File::create(dst).map_err(|e| StackError::io(format!("creating {}", dst.display()), e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", src)
        .map_err(|e| StackError::io("packing staging area", e))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| StackError::io("finishing tar stream", e))?;
    let file = encoder
        .finish()
        .map_err(|e| StackError::io("finishing gzip stream", e))?;
    file.sync_all()
        .map_err(|e| StackError::io("syncing archive", e))?;
    Ok(())
}
