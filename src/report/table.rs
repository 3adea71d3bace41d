//! Terminal table for artifact listings.
//!
//! One row per artifact, newest first (the order `list_artifacts` returns),
//! followed by a count and total size.

use crate::artifact::Artifact;
use crate::util::{format_bytes, truncate};

pub fn render(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return String::from("No backups found. Run 'dbsnap backup' to create one.\n");
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<40} {:<14} {:<20} {:>10}\n",
        "Artifact", "Backend", "Created (UTC)", "Size"
    ));
    output.push_str(&"-".repeat(87));
    output.push('\n');

    let mut total: u64 = 0;
    for artifact in artifacts {
        total = total.saturating_add(artifact.size_bytes);
        output.push_str(&format!(
            "{:<40} {:<14} {:<20} {:>10}\n",
            truncate(&artifact.file_name(), 40),
            artifact.backend_kind.as_str(),
            artifact.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_bytes(artifact.size_bytes)
        ));
    }

    output.push_str(&format!(
        "\n{} artifact(s), {} total\n",
        artifacts.len(),
        format_bytes(total)
    ));

    output
}
