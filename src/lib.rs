//! Backup and restore for an application database that lives either in a
//! single SQLite file or in PostgreSQL.
//!
//! The backend is chosen by `DATABASE_URL` alone: unset or empty means the
//! SQLite file, anything else must be a postgres connection URI.

pub mod artifact;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod manager;
pub mod operation;
pub mod platform;
pub mod report;
pub mod util;

pub use artifact::{Artifact, ArtifactFormat, BackendKind};
pub use backend::Backend;
pub use config::Config;
pub use error::{Result, SnapshotError};
pub use manager::SnapshotManager;
