//! Error taxonomy for backup and restore.
//!
//! Every variant is terminal for the invocation that produced it. The binary
//! maps all of them to exit status 1 with a one-line diagnostic.
//!
//! Variants wrapping another error leave it out of their own message and
//! expose it through `source()`; print with `{:#}` (anyhow) to get the chain.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::artifact::ArtifactFormat;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source database not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("{tool}: not found (is it installed and on PATH?)")]
    ToolNotFound { tool: String },

    #[error("{tool}: timed out after {}", humantime::format_duration(*.after))]
    ToolTimedOut { tool: String, after: Duration },

    #[error("dump failed ({status}): {stderr}")]
    DumpFailed { status: String, stderr: String },

    #[error("load failed ({status}): {stderr}")]
    LoadFailed { status: String, stderr: String },

    #[error("artifact format mismatch: backend expects {expected}, artifact is {found}")]
    FormatMismatch {
        expected: ArtifactFormat,
        found: ArtifactFormat,
    },

    #[error("unrecognized artifact: {}", .0.display())]
    UnrecognizedArtifact(PathBuf),

    #[error("usage: {0}")]
    Usage(String),

    #[error("sqlite")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            context: context.into(),
            source,
        }
    }
}
