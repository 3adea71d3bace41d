//! Artifact discovery in an output directory.

use std::path::Path;

use log::debug;
use walkdir::WalkDir;

use super::{parse_artifact_name, Artifact};
use crate::error::{Result, SnapshotError};

/// All artifacts directly inside `dir`, newest first.
///
/// Only files whose names follow the artifact scheme are returned; temporary
/// `.partial` files and anything else in the directory are skipped. A
/// directory that does not exist yet simply holds no artifacts.
pub fn list_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::ErrorKind::Other.into());
                return Err(SnapshotError::io(format!("failed to read {}", dir.display()), io));
            }
            Err(e) => {
                debug!("skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else { continue };
        let Some(parsed) = parse_artifact_name(name) else { continue };

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);

        found.push((
            parsed.attempt,
            Artifact {
                backend_kind: parsed.kind,
                created_at: parsed.created_at,
                storage_path: entry.into_path(),
                format: parsed.kind.format(),
                size_bytes,
            },
        ));
    }

    found.sort_by(|(a_attempt, a), (b_attempt, b)| {
        b.created_at
            .cmp(&a.created_at)
            .then(b_attempt.cmp(a_attempt))
            .then(b.storage_path.cmp(&a.storage_path))
    });

    Ok(found.into_iter().map(|(_, artifact)| artifact).collect())
}
