//! Client/server backend: PostgreSQL through pg_dump and psql.
//!
//! Dumps are plain SQL with ownership and privilege statements stripped, so
//! they load into a server provisioned with different roles.
//!
//! Restores replay the dump with psql. This is NOT an atomic swap: statements
//! run one after another against whatever the target already contains, and
//! by default a failing statement does not stop the rest. Pass
//! `single_transaction` to make psql stop at the first error and roll back.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::descriptor::ConnectionDescriptor;
use super::process::{self, tool_name};
use crate::artifact::writer::PendingArtifact;
use crate::artifact::{Artifact, ArtifactFormat, BackendKind};
use crate::error::{Result, SnapshotError};
use crate::platform;

/// libpq reads the password from here when the connection string has none.
pub const PGPASSWORD_VAR: &str = "PGPASSWORD";

/// Environment for a tool run: the URI's password, if it has one. Without
/// one the tool falls back to an inherited `PGPASSWORD`, then `~/.pgpass`.
fn tool_env(descriptor: &ConnectionDescriptor) -> Vec<(&'static str, &str)> {
    match descriptor.password() {
        Some(password) => vec![(PGPASSWORD_VAR, password)],
        None => Vec::new(),
    }
}

/// Writes a logical snapshot of the database to a file.
pub trait Dumper {
    fn name(&self) -> String;

    /// Fail with `ToolNotFound` if the dump tool cannot run here.
    fn ensure_available(&self) -> Result<()>;

    fn dump(&self, descriptor: &ConnectionDescriptor, dest: &Path) -> Result<()>;
}

/// Replays a dump file into the database.
pub trait Loader {
    fn name(&self) -> String;

    /// Fail with `ToolNotFound` if the load tool cannot run here.
    fn ensure_available(&self) -> Result<()>;

    fn load(&self, descriptor: &ConnectionDescriptor, source: &Path) -> Result<()>;
}

pub struct PgDump {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl PgDump {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        PgDump {
            program: program.into(),
            timeout,
        }
    }

    pub fn args(&self, descriptor: &ConnectionDescriptor, dest: &Path) -> Vec<OsString> {
        let mut file_arg = OsString::from("--file=");
        file_arg.push(dest.as_os_str());

        vec![
            OsString::from("--format=plain"),
            OsString::from("--no-owner"),
            OsString::from("--no-privileges"),
            file_arg,
            OsString::from(format!("--dbname={}", descriptor.tool_uri())),
        ]
    }
}

impl Dumper for PgDump {
    fn name(&self) -> String {
        tool_name(&self.program)
    }

    fn ensure_available(&self) -> Result<()> {
        platform::probe_tool(&self.program)
    }

    fn dump(&self, descriptor: &ConnectionDescriptor, dest: &Path) -> Result<()> {
        let output = process::run(
            &self.program,
            &self.args(descriptor, dest),
            &tool_env(descriptor),
            self.timeout,
        )?;

        if !output.success() {
            return Err(SnapshotError::DumpFailed {
                status: output.status_text(),
                stderr: output.stderr_summary(),
            });
        }

        if !output.stderr.trim().is_empty() {
            warn!("{}: {}", self.name(), output.stderr_summary());
        }

        Ok(())
    }
}

pub struct Psql {
    program: PathBuf,
    timeout: Option<Duration>,
    single_transaction: bool,
}

impl Psql {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>, single_transaction: bool) -> Self {
        Psql {
            program: program.into(),
            timeout,
            single_transaction,
        }
    }

    pub fn args(&self, descriptor: &ConnectionDescriptor, source: &Path) -> Vec<OsString> {
        let mut file_arg = OsString::from("--file=");
        file_arg.push(source.as_os_str());

        let mut args = vec![
            OsString::from("--no-psqlrc"),
            OsString::from("--quiet"),
            OsString::from(format!("--dbname={}", descriptor.tool_uri())),
            file_arg,
        ];

        if self.single_transaction {
            args.push(OsString::from("--single-transaction"));
            args.push(OsString::from("--set=ON_ERROR_STOP=1"));
        }

        args
    }
}

impl Loader for Psql {
    fn name(&self) -> String {
        tool_name(&self.program)
    }

    fn ensure_available(&self) -> Result<()> {
        platform::probe_tool(&self.program)
    }

    fn load(&self, descriptor: &ConnectionDescriptor, source: &Path) -> Result<()> {
        let output = process::run(
            &self.program,
            &self.args(descriptor, source),
            &tool_env(descriptor),
            self.timeout,
        )?;

        if !output.success() {
            return Err(SnapshotError::LoadFailed {
                status: output.status_text(),
                stderr: output.stderr_summary(),
            });
        }

        // without ON_ERROR_STOP psql exits 0 even when statements failed
        let failed = output.stderr.lines().filter(|l| l.contains("ERROR:")).count();
        if failed > 0 {
            warn!(
                "{}: {failed} statement(s) failed during replay, target may be partially restored: {}",
                self.name(),
                output.stderr_summary()
            );
        }

        Ok(())
    }
}

/// Dump the database into a new artifact under `output_dir`.
///
/// The tool is checked before anything touches the filesystem. The dump is
/// written to a temporary file and only published once the tool exits 0.
pub fn backup(
    dumper: &dyn Dumper,
    descriptor: &ConnectionDescriptor,
    output_dir: &Path,
    created_at: DateTime<Utc>,
) -> Result<Artifact> {
    dumper.ensure_available()?;

    info!("dumping {descriptor} with {}", dumper.name());

    let pending = PendingArtifact::create(output_dir, BackendKind::ClientServer, created_at)?;
    dumper.dump(descriptor, pending.path())?;
    pending.publish()
}

/// Replay a dump artifact into the database.
pub fn restore(loader: &dyn Loader, descriptor: &ConnectionDescriptor, artifact: &Artifact) -> Result<()> {
    if artifact.format != ArtifactFormat::DumpText {
        return Err(SnapshotError::FormatMismatch {
            expected: ArtifactFormat::DumpText,
            found: artifact.format,
        });
    }

    loader.ensure_available()?;

    info!(
        "replaying {} into {descriptor} with {}",
        artifact.storage_path.display(),
        loader.name()
    );

    loader.load(descriptor, &artifact.storage_path)
}
