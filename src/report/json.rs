//! JSON output for artifact listings, for scripting and piping.

use crate::artifact::Artifact;

pub fn render(artifacts: &[Artifact]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(artifacts)
}
