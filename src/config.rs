//! Configuration.
//!
//! Layers, lowest to highest: built-in defaults, the TOML config file, then
//! command-line flags. The connection descriptor is the exception: it only
//! ever comes from `DATABASE_URL`, so nothing but that variable can change
//! which backend is used.
//!
//! ```toml
//! consistent = false
//!
//! [paths]
//! sqlite_path = "instance/app.db"
//! output_dir = "backups"
//!
//! [tools]
//! pg_dump = "/usr/lib/postgresql/16/bin/pg_dump"
//! psql = "psql"
//! timeout = "30m"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::cli::{BackupArgs, ListArgs, RestoreArgs};
use crate::error::{Result, SnapshotError};
use crate::platform;

pub const DEFAULT_SQLITE_PATH: &str = "instance/app.db";
pub const DEFAULT_OUTPUT_DIR: &str = "backups";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub sqlite_path: PathBuf,
    pub output_dir: PathBuf,
    pub pg_dump: PathBuf,
    pub psql: PathBuf,
    pub tool_timeout: Option<Duration>,
    pub consistent: bool,
    pub single_transaction: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            pg_dump: PathBuf::from("pg_dump"),
            psql: PathBuf::from("psql"),
            tool_timeout: None,
            consistent: false,
            single_transaction: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub consistent: Option<bool>,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    pub sqlite_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    pub pg_dump: Option<PathBuf>,
    pub psql: Option<PathBuf>,
    pub timeout: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| SnapshotError::Configuration(format!("invalid config file: {}", e.message())))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnapshotError::Configuration(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }
}

impl Config {
    /// Defaults, overlaid with the config file and `DATABASE_URL`.
    ///
    /// An explicitly named config file (flag or `DBSNAP_CONFIG`) must exist;
    /// the platform default is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        let explicit = explicit.map(Path::to_path_buf).or_else(platform::config_path_from_env);
        let file = match explicit {
            Some(path) => Some(FileConfig::load(&path)?),
            None => match platform::default_config_path() {
                Some(path) if path.is_file() => {
                    debug!("using config file {}", path.display());
                    Some(FileConfig::load(&path)?)
                }
                _ => None,
            },
        };

        if let Some(file) = file {
            config.apply_file(file)?;
        }

        config.database_url = platform::database_url();
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(consistent) = file.consistent {
            self.consistent = consistent;
        }
        if let Some(path) = file.paths.sqlite_path {
            self.sqlite_path = path;
        }
        if let Some(dir) = file.paths.output_dir {
            self.output_dir = dir;
        }
        if let Some(program) = file.tools.pg_dump {
            self.pg_dump = program;
        }
        if let Some(program) = file.tools.psql {
            self.psql = program;
        }
        if let Some(timeout) = file.tools.timeout {
            let parsed = humantime::parse_duration(&timeout).map_err(|e| {
                SnapshotError::Configuration(format!("invalid tools.timeout '{timeout}': {e}"))
            })?;
            self.tool_timeout = Some(parsed);
        }
        Ok(())
    }

    pub fn apply_backup_args(&mut self, args: &BackupArgs) {
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        if args.consistent {
            self.consistent = true;
        }
        if args.timeout.is_some() {
            self.tool_timeout = args.timeout;
        }
    }

    pub fn apply_restore_args(&mut self, args: &RestoreArgs) {
        if args.single_transaction {
            self.single_transaction = true;
        }
        if args.timeout.is_some() {
            self.tool_timeout = args.timeout;
        }
    }

    pub fn apply_list_args(&mut self, args: &ListArgs) {
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_application_layout() {
        let config = Config::default();
        assert_eq!(config.sqlite_path, PathBuf::from("instance/app.db"));
        assert_eq!(config.output_dir, PathBuf::from("backups"));
        assert_eq!(config.tool_timeout, None);
        assert!(!config.consistent);
    }

    #[test]
    fn file_overrides_defaults() {
        let file = FileConfig::parse(
            r#"
            consistent = true

            [paths]
            sqlite_path = "/srv/app/instance/app.db"

            [tools]
            pg_dump = "/opt/pg/bin/pg_dump"
            timeout = "30m"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file).unwrap();

        assert!(config.consistent);
        assert_eq!(config.sqlite_path, PathBuf::from("/srv/app/instance/app.db"));
        assert_eq!(config.output_dir, PathBuf::from("backups"));
        assert_eq!(config.pg_dump, PathBuf::from("/opt/pg/bin/pg_dump"));
        assert_eq!(config.psql, PathBuf::from("psql"));
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn flags_override_file() {
        let mut config = Config::default();
        config
            .apply_file(FileConfig::parse("[paths]\noutput_dir = \"from-file\"\n[tools]\ntimeout = \"1h\"").unwrap())
            .unwrap();

        config.apply_backup_args(&BackupArgs {
            output_dir: Some(PathBuf::from("from-flag")),
            consistent: false,
            timeout: Some(Duration::from_secs(5)),
        });

        assert_eq!(config.output_dir, PathBuf::from("from-flag"));
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn database_url_is_not_a_file_option() {
        let err = FileConfig::parse("database_url = \"postgres://x/y\"").unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(_)));
    }

    #[test]
    fn bad_timeout_is_configuration_error() {
        let mut config = Config::default();
        let err = config
            .apply_file(FileConfig::parse("[tools]\ntimeout = \"soon\"").unwrap())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(ref m) if m.contains("soon")));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(_)));
    }
}
