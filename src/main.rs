use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use log::debug;

use dbsnap::artifact::list::list_artifacts;
use dbsnap::cli::{Cli, Command};
use dbsnap::config::Config;
use dbsnap::report;
use dbsnap::{SnapshotError, SnapshotManager};

fn init_logger(verbose: u8) {
    // RUST_LOG wins over -v
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Backup(args) => {
            config.apply_backup_args(&args);
            let manager = SnapshotManager::new(&config)?;
            debug!("backend: {}", manager.backend());

            let artifact = manager.backup()?;
            println!("{}", artifact.storage_path.display());
        }
        Command::Restore(args) => {
            // a bare `restore` stops here, before the backend is touched
            let artifact = args
                .artifact
                .clone()
                .ok_or_else(|| SnapshotError::Usage("dbsnap restore <artifact_path>".into()))?;

            config.apply_restore_args(&args);
            let manager = SnapshotManager::new(&config)?;
            debug!("backend: {}", manager.backend());

            manager.restore(&artifact)?;
            eprintln!("restored from {}", artifact.display());
        }
        Command::List(args) => {
            config.apply_list_args(&args);
            let artifacts = list_artifacts(&config.output_dir)?;
            report::print(&artifacts, args.json).context("failed to render listing")?;
        }
    }

    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logger(cli.verbose);

    if let Err(e) = run(cli) {
        // {:#} keeps the whole cause chain on one line
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
