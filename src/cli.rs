use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dbsnap")]
#[command(about = "Back up and restore the application database (SQLite file or PostgreSQL)")]
#[command(long_about = "Back up and restore the application database.\n\n\
    With DATABASE_URL unset or empty the SQLite file is copied; with DATABASE_URL set \
    the PostgreSQL database is dumped with pg_dump and replayed with psql.")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to $DBSNAP_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output, repeat for debug
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Snapshot the database and print the artifact path
    Backup(BackupArgs),

    /// Restore the database from an artifact
    Restore(RestoreArgs),

    /// List artifacts in the output directory
    List(ListArgs),
}

#[derive(Parser)]
pub struct BackupArgs {
    /// Directory to write the artifact to (defaults to ./backups)
    pub output_dir: Option<PathBuf>,

    /// SQLite only: use the online backup API instead of a raw file copy
    #[arg(long, default_value_t = false)]
    pub consistent: bool,

    /// Kill pg_dump if it runs longer than this (e.g. 90s, 30m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Parser)]
pub struct RestoreArgs {
    /// Artifact to restore from
    // optional so a missing path is reported as our own usage error
    pub artifact: Option<PathBuf>,

    /// PostgreSQL only: replay in one transaction and stop at the first error
    #[arg(long, default_value_t = false)]
    pub single_transaction: bool,

    /// Kill psql if it runs longer than this (e.g. 90s, 30m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Directory to look in (defaults to ./backups)
    pub output_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_with_dir_and_timeout() {
        let cli = Cli::try_parse_from(["dbsnap", "backup", "/var/backups", "--timeout", "90s"]).unwrap();
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.output_dir, Some(PathBuf::from("/var/backups")));
                assert_eq!(args.timeout, Some(Duration::from_secs(90)));
                assert!(!args.consistent);
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn restore_without_artifact_parses() {
        let cli = Cli::try_parse_from(["dbsnap", "restore"]).unwrap();
        assert!(matches!(cli.command, Command::Restore(RestoreArgs { artifact: None, .. })));
    }

    #[test]
    fn verbosity_counts_and_is_global() {
        let cli = Cli::try_parse_from(["dbsnap", "list", "-vv", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::List(ListArgs { json: true, .. })));
    }

    #[test]
    fn bad_duration_rejected() {
        assert!(Cli::try_parse_from(["dbsnap", "backup", "--timeout", "later"]).is_err());
    }
}
