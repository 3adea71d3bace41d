//! Backup artifacts.
//!
//! An artifact is one immutable point-in-time snapshot on disk. Its name
//! carries the backend kind and a UTC timestamp at one-second resolution:
//! - embedded file:  sqlite_backup_20260101_120000.db
//! - client/server:  postgres_backup_20260101_120000.sql
//!
//! When two backups land in the same second the later one gets a numeric
//! suffix (`_1`, `_2`, ...) instead of overwriting, see `writer`.

pub mod list;
pub mod writer;

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{Result, SnapshotError};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// First 16 bytes of every non-empty SQLite database file.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    EmbeddedFile,
    ClientServer,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::EmbeddedFile => "embedded-file",
            BackendKind::ClientServer => "client-server",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            BackendKind::EmbeddedFile => "sqlite_backup",
            BackendKind::ClientServer => "postgres_backup",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BackendKind::EmbeddedFile => "db",
            BackendKind::ClientServer => "sql",
        }
    }

    pub fn format(self) -> ArtifactFormat {
        match self {
            BackendKind::EmbeddedFile => ArtifactFormat::RawFile,
            BackendKind::ClientServer => ArtifactFormat::DumpText,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    /// Byte copy of an SQLite database file.
    RawFile,
    /// Plain SQL text as written by pg_dump.
    DumpText,
}

impl ArtifactFormat {
    pub fn backend_kind(self) -> BackendKind {
        match self {
            ArtifactFormat::RawFile => BackendKind::EmbeddedFile,
            ArtifactFormat::DumpText => BackendKind::ClientServer,
        }
    }

    /// Sniff the format of an existing file.
    ///
    /// The SQLite header wins over the extension. Without it, `.sql` is a dump
    /// and an empty `.db`/`.sqlite`/`.sqlite3` is a raw file (an empty file is
    /// a valid, empty SQLite database). Anything else is rejected.
    pub fn detect(path: &Path) -> Result<ArtifactFormat> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SnapshotError::ArtifactNotFound(path.to_path_buf()),
            _ => SnapshotError::io(format!("failed to open {}", path.display()), e),
        })?;

        let mut header = Vec::with_capacity(SQLITE_HEADER.len());
        file.take(SQLITE_HEADER.len() as u64)
            .read_to_end(&mut header)
            .map_err(|e| SnapshotError::io(format!("failed to read {}", path.display()), e))?;

        if header.as_slice() == SQLITE_HEADER {
            return Ok(ArtifactFormat::RawFile);
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("sql") => Ok(ArtifactFormat::DumpText),
            Some("db" | "sqlite" | "sqlite3") if header.is_empty() => Ok(ArtifactFormat::RawFile),
            _ => Err(SnapshotError::UnrecognizedArtifact(path.to_path_buf())),
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFormat::RawFile => f.write_str("raw sqlite file"),
            ArtifactFormat::DumpText => f.write_str("sql dump"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub backend_kind: BackendKind,
    pub created_at: DateTime<Utc>,
    pub storage_path: PathBuf,
    pub format: ArtifactFormat,
    pub size_bytes: u64,
}

impl Artifact {
    /// Inspect an existing artifact for restore.
    ///
    /// The format is sniffed from the content, never trusted from the name.
    /// `created_at` comes from the file name when it follows our scheme and
    /// falls back to the modification time otherwise.
    pub fn open(path: &Path) -> Result<Artifact> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SnapshotError::ArtifactNotFound(path.to_path_buf()),
            _ => SnapshotError::io(format!("failed to stat {}", path.display()), e),
        })?;

        if !metadata.is_file() {
            return Err(SnapshotError::ArtifactNotFound(path.to_path_buf()));
        }

        let format = ArtifactFormat::detect(path)?;

        let created_at = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_artifact_name)
            .map(|parsed| parsed.created_at)
            .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
            .unwrap_or_else(Utc::now);

        Ok(Artifact {
            backend_kind: format.backend_kind(),
            created_at,
            storage_path: path.to_path_buf(),
            format,
            size_bytes: metadata.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.storage_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Build the file name for an artifact. `attempt` 0 has no suffix.
pub fn artifact_name(kind: BackendKind, created_at: DateTime<Utc>, attempt: u32) -> String {
    let stamp = created_at.format(TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{stamp}.{}", kind.prefix(), kind.extension())
    } else {
        format!("{}_{stamp}_{attempt}.{}", kind.prefix(), kind.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub kind: BackendKind,
    pub created_at: DateTime<Utc>,
    pub attempt: u32,
}

/// Inverse of `artifact_name`. Returns None for files we did not write.
pub fn parse_artifact_name(file_name: &str) -> Option<ParsedName> {
    for kind in [BackendKind::EmbeddedFile, BackendKind::ClientServer] {
        let Some(rest) = file_name.strip_prefix(kind.prefix()) else { continue };
        let Some(rest) = rest.strip_prefix('_') else { continue };
        let Some(stem) = rest
            .strip_suffix(kind.extension())
            .and_then(|s| s.strip_suffix('.'))
        else {
            continue;
        };

        // YYYYMMDD_HHMMSS is 15 chars, optionally followed by _<n>
        if stem.len() < 15 || !stem.is_char_boundary(15) {
            return None;
        }
        let (stamp, suffix) = stem.split_at(15);
        let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

        let attempt = match suffix {
            "" => 0,
            s => {
                let digits = s.strip_prefix('_')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse().ok()?
            }
        };

        return Some(ParsedName {
            kind,
            created_at: naive.and_utc(),
            attempt,
        });
    }
    None
}
