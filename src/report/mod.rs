//! Rendering for `dbsnap list`.

pub mod json;
pub mod table;

use crate::artifact::Artifact;

pub fn print(artifacts: &[Artifact], as_json: bool) -> Result<(), serde_json::Error> {
    if as_json {
        println!("{}", json::render(artifacts)?);
    } else {
        print!("{}", table::render(artifacts));
    }
    Ok(())
}
