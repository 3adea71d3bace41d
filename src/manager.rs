//! Snapshot Manager: the two public operations and backend dispatch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::artifact::Artifact;
use crate::backend::embedded::{self, CopyMode};
use crate::backend::server::{self, Dumper, Loader, PgDump, Psql};
use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Result, SnapshotError};
use crate::operation::{Operation, OperationKind};

pub struct SnapshotManager {
    backend: Backend,
    output_dir: PathBuf,
    copy_mode: CopyMode,
    dumper: Box<dyn Dumper>,
    loader: Box<dyn Loader>,
}

impl SnapshotManager {
    /// Resolve the backend from `config` and wire up pg_dump/psql.
    ///
    /// Fails with `Configuration` on a malformed `DATABASE_URL` before any
    /// file is touched.
    pub fn new(config: &Config) -> Result<Self> {
        let dumper = Box::new(PgDump::new(&config.pg_dump, config.tool_timeout));
        let loader = Box::new(Psql::new(&config.psql, config.tool_timeout, config.single_transaction));
        Self::with_tools(config, dumper, loader)
    }

    /// Same as `new` with caller-supplied dump/load implementations.
    pub fn with_tools(config: &Config, dumper: Box<dyn Dumper>, loader: Box<dyn Loader>) -> Result<Self> {
        let backend = Backend::resolve(config.database_url.as_deref(), &config.sqlite_path)?;
        let copy_mode = if config.consistent {
            CopyMode::Consistent
        } else {
            CopyMode::Raw
        };

        Ok(SnapshotManager {
            backend,
            output_dir: config.output_dir.clone(),
            copy_mode,
            dumper,
            loader,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backup(&self) -> Result<Artifact> {
        self.backup_at(Utc::now())
    }

    /// Back up with an explicit timestamp for the artifact name.
    pub fn backup_at(&self, created_at: DateTime<Utc>) -> Result<Artifact> {
        Operation::new(OperationKind::Backup).run(|| match &self.backend {
            Backend::EmbeddedFile { db_path } => {
                embedded::backup(db_path, &self.output_dir, created_at, self.copy_mode)
            }
            Backend::ClientServer { descriptor } => {
                server::backup(self.dumper.as_ref(), descriptor, &self.output_dir, created_at)
            }
        })
    }

    /// Restore from the artifact at `path`.
    ///
    /// Embedded: the live file is replaced. Client/server: the dump is
    /// replayed statement by statement, which is not atomic.
    pub fn restore(&self, path: &Path) -> Result<()> {
        Operation::new(OperationKind::Restore).run(|| {
            let artifact = Artifact::open(path)?;

            if artifact.backend_kind != self.backend.kind() {
                return Err(SnapshotError::FormatMismatch {
                    expected: self.backend.kind().format(),
                    found: artifact.format,
                });
            }

            match &self.backend {
                Backend::EmbeddedFile { db_path } => embedded::restore(&artifact, db_path),
                Backend::ClientServer { descriptor } => {
                    server::restore(self.loader.as_ref(), descriptor, &artifact)
                }
            }
        })
    }
}
