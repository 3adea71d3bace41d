use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, SnapshotError};

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const CONFIG_PATH_VAR: &str = "DBSNAP_CONFIG";

/// Raw connection descriptor from the environment. Empty counts as unset.
pub fn database_url() -> Option<String> {
    std::env::var(DATABASE_URL_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Platform config file location (~/.config/dbsnap/config.toml on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "dbsnap")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Check that an external tool can be started, without side effects.
///
/// Runs `<program> --version`; pg_dump and psql both answer it without
/// touching a server.
pub fn probe_tool(program: &Path) -> Result<()> {
    let tool = program
        .file_name()
        .unwrap_or_else(|| OsStr::new("tool"))
        .to_string_lossy()
        .into_owned();

    match Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => Err(SnapshotError::ToolNotFound { tool }),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            Err(SnapshotError::ToolNotFound { tool })
        }
        Err(e) => Err(SnapshotError::io(format!("failed to run {tool} --version"), e)),
    }
}
