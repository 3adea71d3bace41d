//! Atomic artifact writes.
//!
//! Nothing is ever written at a final artifact path directly. Writers fill a
//! hidden `.partial` file in the destination directory, and `publish` links it
//! to a free artifact name only once the content is complete. If the write
//! fails, or the pending artifact is dropped without publishing, the
//! temporary file is removed.
//!
//! A process killed mid-write can still leave a `.partial` file behind. Those
//! are dot-files and never match an artifact name, so `list` ignores them.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{artifact_name, Artifact, BackendKind};
use crate::error::{Result, SnapshotError};

// suffixes tried per second before giving up
const MAX_ATTEMPTS: u32 = 1000;

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(0);

/// Temporary file removed on drop unless it was moved into place.
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    /// Reserve a unique hidden path next to `target`. The file itself is not
    /// created; whoever writes it does that.
    pub fn beside(target: &Path) -> Result<TempFile> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        let base = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let id = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(".{base}.{}.{id}.partial", std::process::id()));

        Ok(TempFile { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the written content to disk.
    pub fn sync(&self) -> Result<()> {
        File::open(&self.path)
            .and_then(|f| f.sync_all())
            .map_err(|e| SnapshotError::io(format!("failed to sync {}", self.path.display()), e))
    }

    /// Move the temporary file over `target`, replacing it atomically.
    pub fn replace(mut self, target: &Path) -> Result<()> {
        self.sync()?;
        fs::rename(&self.path, target).map_err(|e| {
            SnapshotError::io(
                format!("failed to move {} to {}", self.path.display(), target.display()),
                e,
            )
        })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("removed incomplete file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove incomplete file {}: {e}", self.path.display()),
        }
    }
}

/// An artifact being written. Call `publish` once the content at `path()` is
/// complete.
pub struct PendingArtifact {
    temp: TempFile,
    dir: PathBuf,
    kind: BackendKind,
    created_at: DateTime<Utc>,
}

impl PendingArtifact {
    /// Ensure the output directory exists and reserve a temporary path in it.
    pub fn create(dir: &Path, kind: BackendKind, created_at: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            SnapshotError::io(format!("failed to create output directory {}", dir.display()), e)
        })?;

        let temp = TempFile::beside(&dir.join(artifact_name(kind, created_at, 0)))?;

        Ok(PendingArtifact {
            temp,
            dir: dir.to_path_buf(),
            kind,
            created_at,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Give the completed file its final name without overwriting anything.
    ///
    /// The first free name out of `<prefix>_<ts>.<ext>`, `<prefix>_<ts>_1.<ext>`,
    /// ... is claimed with a hard link, which fails instead of clobbering when
    /// another backup got there first.
    pub fn publish(mut self) -> Result<Artifact> {
        self.temp.sync()?;

        let size_bytes = fs::metadata(self.temp.path())
            .map_err(|e| {
                SnapshotError::io(format!("failed to stat {}", self.temp.path().display()), e)
            })?
            .len();

        for attempt in 0..MAX_ATTEMPTS {
            let target = self.dir.join(artifact_name(self.kind, self.created_at, attempt));

            if claim(self.temp.path(), &target)? {
                if attempt > 0 {
                    debug!("name collision, published with suffix {attempt}");
                }
                // the link holds the content now, the temp name can go
                if let Err(e) = fs::remove_file(self.temp.path()) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("could not remove {}: {e}", self.temp.path().display());
                    }
                }
                self.temp.armed = false;

                return Ok(Artifact {
                    backend_kind: self.kind,
                    created_at: self.created_at,
                    storage_path: target,
                    format: self.kind.format(),
                    size_bytes,
                });
            }
        }

        Err(SnapshotError::io(
            format!(
                "no free artifact name in {} after {MAX_ATTEMPTS} attempts",
                self.dir.display()
            ),
            ErrorKind::AlreadyExists.into(),
        ))
    }
}

/// Returns Ok(false) when `target` is already taken.
fn claim(source: &Path, target: &Path) -> Result<bool> {
    match fs::hard_link(source, target) {
        Ok(()) => return Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => debug!("hard link unavailable ({e}), falling back to placeholder + rename"),
    }

    claim_with_placeholder(source, target)
}

/// For filesystems without hard links: reserve the name with an exclusive
/// create, then rename over the placeholder.
///
/// An empty file at an artifact name reads as a valid empty database, so the
/// placeholder must not survive a failed rename.
fn claim_with_placeholder(source: &Path, target: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(SnapshotError::io(format!("failed to create {}", target.display()), e));
        }
    }

    if let Err(e) = fs::rename(source, target) {
        if let Err(cleanup) = fs::remove_file(target) {
            warn!("could not remove placeholder {}: {cleanup}", target.display());
        }
        return Err(SnapshotError::io(format!("failed to move into {}", target.display()), e));
    }

    Ok(true)
}
