//! Artifact store behaviour on a real filesystem
//!
//! - retention keeps exactly the artifacts younger than the horizon
//! - commit/open round-trips reproduce dump bytes and state files
//! - unrelated files in the store directory are never touched

use chrono::NaiveDateTime;
use stack_common::{ArtifactStore, Manifest};
use std::fs;

fn manifest(has_app_state: bool) -> Manifest {
    Manifest {
        created_at: chrono::Utc::now().to_rfc3339(),
        tool_version: "test".into(),
        db_name: "flows".into(),
        app_version: "1.64.0".into(),
        db_version: "15.4".into(),
        has_app_state,
        has_worker_state: false,
    }
}

fn commit_aged(store: &ArtifactStore, age_days: i64, now: NaiveDateTime) -> String {
    let staging = store.create(now - chrono::Duration::days(age_days)).unwrap();
    fs::write(staging.dump_path(), b"dump").unwrap();
    store.commit(staging, &manifest(false)).unwrap().file_name()
}

#[test]
fn test_retention_seven_days_keeps_young_artifacts_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "backup");
    let now = chrono::Local::now().naive_local();

    let mut names = Vec::new();
    for age in [0, 5, 8, 10] {
        names.push((age, commit_aged(&store, age, now)));
    }
    // An unrelated file must survive any sweep.
    fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    let removed = store.apply_retention(7, now).unwrap();
    assert_eq!(removed, 2);

    let remaining: Vec<String> = store
        .list()
        .unwrap()
        .iter()
        .map(|a| a.file_name())
        .collect();
    for (age, name) in &names {
        if *age <= 5 {
            assert!(remaining.contains(name), "{} should survive", name);
        } else {
            assert!(!remaining.contains(name), "{} should be swept", name);
        }
    }
    assert!(dir.path().join("notes.txt").exists());
}

#[test]
fn test_retention_boundary_is_strictly_older_than_cutoff() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "backup");
    let now = chrono::Local::now().naive_local();

    commit_aged(&store, 7, now);
    let removed = store.apply_retention(7, now).unwrap();
    assert_eq!(removed, 0, "an artifact exactly at the horizon stays");
}

#[test]
fn test_commit_open_round_trip_preserves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("store"), "backup");
    let now = chrono::Local::now().naive_local();

    let staging = store.create(now).unwrap();
    fs::write(staging.dump_path(), b"PGDMP-bytes").unwrap();
    fs::create_dir_all(staging.app_state_dir().join("nested")).unwrap();
    fs::write(staging.app_state_dir().join("settings.json"), b"{}").unwrap();
    fs::write(
        staging.app_state_dir().join("nested").join("cred.bin"),
        b"\x00\x01\x02",
    )
    .unwrap();
    let artifact = store.commit(staging, &manifest(true)).unwrap();

    let (opened, opened_manifest) = store.open(&artifact).unwrap();
    assert!(opened_manifest.has_app_state);
    assert_eq!(fs::read(opened.dump_path()).unwrap(), b"PGDMP-bytes");
    assert_eq!(
        fs::read(opened.app_state_dir().join("nested").join("cred.bin")).unwrap(),
        b"\x00\x01\x02"
    );

    // Recommitting an opened staging area reproduces an equivalent
    // archive.
    let second_store = ArtifactStore::new(dir.path().join("second"), "backup");
    let recommitted = second_store.commit(opened, &opened_manifest).unwrap();
    assert_eq!(recommitted.file_name(), artifact.file_name());

    let (reopened, _) = second_store.open(&recommitted).unwrap();
    assert_eq!(fs::read(reopened.dump_path()).unwrap(), b"PGDMP-bytes");
    assert_eq!(
        fs::read(reopened.app_state_dir().join("settings.json")).unwrap(),
        b"{}"
    );
}

#[test]
fn test_open_missing_dump_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "backup");
    let now = chrono::Local::now().naive_local();

    // A committed archive whose staging never received a dump.
    let staging = store.create(now).unwrap();
    let artifact = store.commit(staging, &manifest(false)).unwrap();

    let err = store.open(&artifact).unwrap_err();
    assert!(matches!(
        err,
        stack_common::StackError::CorruptArchive { .. }
    ));
}

#[test]
fn test_open_truncated_archive_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), "backup");
    let now = chrono::Local::now().naive_local();

    let staging = store.create(now).unwrap();
    fs::write(staging.dump_path(), vec![7u8; 64 * 1024]).unwrap();
    let artifact = store.commit(staging, &manifest(false)).unwrap();

    // Chop the tail off the archive.
    let bytes = fs::read(&artifact.path).unwrap();
    fs::write(&artifact.path, &bytes[..bytes.len() / 2]).unwrap();

    let err = store.open(&artifact).unwrap_err();
    assert!(matches!(
        err,
        stack_common::StackError::CorruptArchive { .. }
    ));
}
