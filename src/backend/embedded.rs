//! Embedded-file backend: the database is one SQLite file.
//!
//! Backups are a byte-exact copy of the file. Nothing locks the database while
//! it is copied, so a backup taken while the application is writing can
//! capture a torn file. `CopyMode::Consistent` uses SQLite's online backup
//! API instead, which is consistent but no longer byte-identical.
//!
//! Restore replaces the live file. It is destructive: whatever the live file
//! held before is gone unless the caller backed it up first.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};

use crate::artifact::writer::{PendingArtifact, TempFile};
use crate::artifact::{Artifact, ArtifactFormat, BackendKind};
use crate::error::{Result, SnapshotError};

/// Files SQLite keeps next to the database while it has uncommitted or
/// un-checkpointed state.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Byte copy of the file as it is on disk.
    #[default]
    Raw,
    /// SQLite online backup, safe against concurrent writers.
    Consistent,
}

/// Copy `db_path` into a new artifact under `output_dir`.
pub fn backup(
    db_path: &Path,
    output_dir: &Path,
    created_at: DateTime<Utc>,
    mode: CopyMode,
) -> Result<Artifact> {
    match fs::metadata(db_path) {
        Ok(m) if m.is_file() => {}
        Ok(_) => return Err(SnapshotError::SourceNotFound(db_path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SnapshotError::SourceNotFound(db_path.to_path_buf()));
        }
        Err(e) => {
            return Err(SnapshotError::io(format!("failed to stat {}", db_path.display()), e));
        }
    }

    if mode == CopyMode::Raw {
        if let Some(sidecar) = active_sidecar(db_path) {
            warn!(
                "{} exists, the database may be mid-write and this copy may be inconsistent (use --consistent)",
                sidecar.display()
            );
        }
    }

    let pending = PendingArtifact::create(output_dir, BackendKind::EmbeddedFile, created_at)?;

    match mode {
        CopyMode::Raw => {
            let copied = fs::copy(db_path, pending.path()).map_err(|e| {
                SnapshotError::io(format!("failed to copy {}", db_path.display()), e)
            })?;
            debug!("copied {copied} bytes from {}", db_path.display());
        }
        CopyMode::Consistent => online_copy(db_path, pending.path())?,
    }

    let artifact = pending.publish()?;
    info!("backed up {} to {}", db_path.display(), artifact.storage_path.display());
    Ok(artifact)
}

/// Replace the live database at `db_path` with the artifact's bytes.
pub fn restore(artifact: &Artifact, db_path: &Path) -> Result<()> {
    if artifact.format != ArtifactFormat::RawFile {
        return Err(SnapshotError::FormatMismatch {
            expected: ArtifactFormat::RawFile,
            found: artifact.format,
        });
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            SnapshotError::io(format!("failed to create {}", parent.display()), e)
        })?;
    }

    // only the bytes are restored, mode and owner stay the live file's
    let live = fs::metadata(db_path).ok();

    let staged = TempFile::beside(db_path)?;
    fs::copy(&artifact.storage_path, staged.path()).map_err(|e| {
        SnapshotError::io(format!("failed to copy {}", artifact.storage_path.display()), e)
    })?;
    if let Some(live) = &live {
        keep_attributes(live, staged.path())?;
    }
    staged.replace(db_path)?;

    // a journal left from the old file would be replayed over the new one
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sidecar_path(db_path, suffix);
        match fs::remove_file(&sidecar) {
            Ok(()) => info!("removed stale {}", sidecar.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SnapshotError::io(
                    format!("restored, but failed to remove stale {}", sidecar.display()),
                    e,
                ));
            }
        }
    }

    info!("restored {} from {}", db_path.display(), artifact.storage_path.display());
    Ok(())
}

fn online_copy(source: &Path, dest: &Path) -> Result<()> {
    let src = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut dst = Connection::open(dest)?;

    {
        let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
        backup.run_to_completion(100, Duration::from_millis(10), None)?;
    }

    dst.close().map_err(|(_, e)| SnapshotError::Sqlite(e))?;
    debug!("online backup of {} complete", source.display());
    Ok(())
}

/// Give `staged` the permissions, and on unix the owner, of the live file.
fn keep_attributes(live: &fs::Metadata, staged: &Path) -> Result<()> {
    fs::set_permissions(staged, live.permissions()).map_err(|e| {
        SnapshotError::io(format!("failed to set permissions on {}", staged.display()), e)
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let current = fs::metadata(staged)
            .map_err(|e| SnapshotError::io(format!("failed to stat {}", staged.display()), e))?;
        if (current.uid(), current.gid()) != (live.uid(), live.gid()) {
            // changing owner needs privileges the restoring user may lack
            if let Err(e) = std::os::unix::fs::chown(staged, Some(live.uid()), Some(live.gid())) {
                warn!(
                    "could not keep owner {}:{} of the live database, restored file is {}:{}: {e}",
                    live.uid(),
                    live.gid(),
                    current.uid(),
                    current.gid()
                );
            }
        }
    }

    Ok(())
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn active_sidecar(db_path: &Path) -> Option<PathBuf> {
    ["-wal", "-journal"]
        .into_iter()
        .map(|suffix| sidecar_path(db_path, suffix))
        .find(|p| fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, second).unwrap()
    }

    fn count_files(dir: &Path) -> usize {
        match fs::read_dir(dir) {
            Ok(rd) => rd.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn roundtrip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("instance").join("app.db");
        fs::create_dir_all(db.parent().unwrap()).unwrap();

        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE srs (id INTEGER PRIMARY KEY, title TEXT);
             INSERT INTO srs (title) VALUES ('login flow'), (NULL);",
        )
        .unwrap();
        drop(conn);
        let original = fs::read(&db).unwrap();

        let artifact = backup(&db, &dir.path().join("backups"), ts(0), CopyMode::Raw).unwrap();
        assert_eq!(fs::read(&artifact.storage_path).unwrap(), original);

        fs::write(&db, b"clobbered").unwrap();
        restore(&artifact, &db).unwrap();

        assert_eq!(fs::read(&db).unwrap(), original);
    }

    #[test]
    fn zero_byte_database_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        fs::write(&db, b"").unwrap();

        let artifact = backup(&db, &dir.path().join("out"), ts(0), CopyMode::Raw).unwrap();
        assert_eq!(artifact.size_bytes, 0);

        fs::write(&db, b"something else").unwrap();
        let reopened = Artifact::open(&artifact.storage_path).unwrap();
        restore(&reopened, &db).unwrap();

        assert_eq!(fs::read(&db).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn missing_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("backups");

        let err = backup(&dir.path().join("absent.db"), &out, ts(0), CopyMode::Raw).unwrap_err();

        assert!(matches!(err, SnapshotError::SourceNotFound(_)));
        assert_eq!(count_files(&out), 0);
    }

    #[test]
    fn directory_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = backup(dir.path(), &dir.path().join("out"), ts(0), CopyMode::Raw).unwrap_err();
        assert!(matches!(err, SnapshotError::SourceNotFound(_)));
    }

    #[test]
    fn backups_a_second_apart_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        fs::write(&db, b"").unwrap();
        let out = dir.path().join("out");

        let a = backup(&db, &out, ts(1), CopyMode::Raw).unwrap();
        let b = backup(&db, &out, ts(2), CopyMode::Raw).unwrap();

        assert_ne!(a.storage_path, b.storage_path);
        assert_eq!(count_files(&out), 2);
    }

    #[test]
    fn consistent_mode_captures_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE reports (id INTEGER PRIMARY KEY, status TEXT);
             INSERT INTO reports (status) VALUES ('passed'), ('failed');",
        )
        .unwrap();

        // conn stays open so the rows live in the WAL, not the main file
        let artifact = backup(&db, &dir.path().join("out"), ts(0), CopyMode::Consistent).unwrap();
        drop(conn);

        let copy = Connection::open(&artifact.storage_path).unwrap();
        let count: i64 = copy
            .query_row("SELECT COUNT(*) FROM reports", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn dump_artifact_is_rejected_before_touching_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        fs::write(&db, b"live").unwrap();
        let dump = dir.path().join("postgres_backup_20261016_120000.sql");
        fs::write(&dump, "CREATE TABLE t (id int);").unwrap();

        let artifact = Artifact::open(&dump).unwrap();
        let err = restore(&artifact, &db).unwrap_err();

        assert!(matches!(err, SnapshotError::FormatMismatch { .. }));
        assert_eq!(fs::read(&db).unwrap(), b"live");
    }

    #[cfg(unix)]
    #[test]
    fn restore_keeps_live_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE t (x);")
            .unwrap();
        fs::set_permissions(&db, fs::Permissions::from_mode(0o660)).unwrap();

        let artifact = backup(&db, &dir.path().join("out"), ts(0), CopyMode::Raw).unwrap();
        // read-only backups must not make the live database read-only
        fs::set_permissions(&artifact.storage_path, fs::Permissions::from_mode(0o444)).unwrap();

        restore(&artifact, &db).unwrap();

        let mode = fs::metadata(&db).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o660, "live mode after restore: {mode:o}");
        assert_eq!(fs::read(&db).unwrap(), fs::read(&artifact.storage_path).unwrap());
        Connection::open(&db)
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
    }

    #[test]
    fn restore_creates_parent_and_clears_stale_journal() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.db");
        fs::write(&source, b"").unwrap();
        let artifact = backup(&source, &dir.path().join("out"), ts(0), CopyMode::Raw).unwrap();

        let live = dir.path().join("fresh").join("instance").join("app.db");
        restore(&artifact, &live).unwrap();
        assert!(live.is_file());

        fs::write(sidecar_path(&live, "-wal"), b"stale").unwrap();
        restore(&artifact, &live).unwrap();
        assert!(!sidecar_path(&live, "-wal").exists());
    }
}
