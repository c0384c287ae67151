//! The YAML manifest a user hands to `rflow`: a named set of patterns
//! and a named set of recipes, loaded once at startup and handed to a
//! single `Monitor`/`Handler`/`Conductor` trio.

use std::collections::HashMap;
use std::path::Path;

use rflow_core::{Error, FileEventPattern, Recipe, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub patterns: HashMap<String, FileEventPattern>,
    #[serde(default)]
    pub recipes: HashMap<String, Recipe>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Manifest> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let manifest: Manifest = serde_yaml::from_str(&contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (key, pattern) in &self.patterns {
            if key != &pattern.name {
                return Err(Error::Consistency(format!(
                    "manifest pattern key '{}' does not match pattern name '{}'",
                    key, pattern.name
                )));
            }
            pattern.validate()?;
        }
        for (key, recipe) in &self.recipes {
            if key != &recipe.name {
                return Err(Error::Consistency(format!(
                    "manifest recipe key '{}' does not match recipe name '{}'",
                    key, recipe.name
                )));
            }
            recipe.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.yml");
        std::fs::write(
            &manifest_path,
            r#"
patterns:
  p1:
    name: p1
    triggering_path: "start/*.txt"
    recipe: r1
    triggering_file: infile
    parameters: {}
    outputs: {}
    event_mask: [file_created]
recipes:
  r1:
    name: r1
    body:
      kind: shell
      source: "cat {infile}"
    parameters: {}
    requirements: {}
"#,
        )
        .unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.patterns.len(), 1);
        assert_eq!(manifest.recipes.len(), 1);
    }

    #[test]
    fn rejects_key_name_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.yml");
        std::fs::write(
            &manifest_path,
            r#"
patterns:
  wrong-key:
    name: p1
    triggering_path: "start/*.txt"
    recipe: r1
    triggering_file: infile
    parameters: {}
    outputs: {}
    event_mask: [file_created]
recipes: {}
"#,
        )
        .unwrap();

        assert!(Manifest::load(&manifest_path).is_err());
    }
}
