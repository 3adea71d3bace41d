pub mod descriptor;
pub mod embedded;
pub mod process;
pub mod server;

use std::path::{Path, PathBuf};

use crate::artifact::BackendKind;
use crate::error::Result;
use descriptor::ConnectionDescriptor;

/// Where the application's state lives. Each variant carries exactly what
/// its strategy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    EmbeddedFile { db_path: PathBuf },
    ClientServer { descriptor: ConnectionDescriptor },
}

impl Backend {
    /// Pick the backend from the connection descriptor alone.
    ///
    /// Unset, empty or whitespace-only selects the embedded file at
    /// `db_path`. Anything else selects client/server and must be a valid
    /// connection URI; a malformed one is a configuration error, never a
    /// fallback to the embedded file.
    pub fn resolve(database_url: Option<&str>, db_path: &Path) -> Result<Backend> {
        match database_url {
            Some(raw) if !raw.trim().is_empty() => Ok(Backend::ClientServer {
                descriptor: ConnectionDescriptor::parse(raw)?,
            }),
            _ => Ok(Backend::EmbeddedFile {
                db_path: db_path.to_path_buf(),
            }),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::EmbeddedFile { .. } => BackendKind::EmbeddedFile,
            Backend::ClientServer { .. } => BackendKind::ClientServer,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::EmbeddedFile { db_path } => write!(f, "sqlite file {}", db_path.display()),
            Backend::ClientServer { descriptor } => write!(f, "postgres {descriptor}"),
        }
    }
}
