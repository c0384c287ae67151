//! Patterns describe what to watch for: a directory regex to monitor, the
//! recipe it triggers, and the parameters (possibly swept across a range)
//! that get handed to that recipe.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vars::VALID_NAME_CHARS;

/// A single value a parameter can take: either fixed, or a numeric sweep
/// expanded into a cartesian product of axis values at bind time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    Single(serde_json::Value),
    Sweep(SweepSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepSpec {
    pub start: f64,
    pub stop: f64,
    pub jump: f64,
}

impl SweepSpec {
    /// Expand to the inclusive-of-stop series `start, start+jump, ...`.
    /// Mirrors a `while val <= stop: yield val; val += jump` loop rather
    /// than a fixed step count, so floating rounding at the boundary
    /// matches the reference behaviour.
    pub fn expand(&self) -> Result<Vec<f64>> {
        if self.jump == 0.0 {
            return Err(Error::validation(
                "sweep",
                "jump must be non-zero or the sweep never terminates",
            ));
        }
        if (self.jump > 0.0 && self.start > self.stop) || (self.jump < 0.0 && self.start < self.stop)
        {
            return Err(Error::validation(
                "sweep",
                "jump direction does not lead from start to stop",
            ));
        }

        let mut values = Vec::new();
        let mut current = self.start;
        let ascending = self.jump > 0.0;
        loop {
            if ascending && current > self.stop {
                break;
            }
            if !ascending && current < self.stop {
                break;
            }
            values.push(current);
            current += self.jump;
        }
        Ok(values)
    }
}

/// A file/directory matching pattern bound to a recipe by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEventPattern {
    pub name: String,
    /// Glob-style pattern against which event paths are matched, e.g.
    /// `"input/*.txt"`.
    pub triggering_path: String,
    pub recipe: String,
    /// Name the matched file is bound to within the recipe's parameters.
    pub triggering_file: String,
    pub parameters: HashMap<String, ParameterValue>,
    pub outputs: HashMap<String, String>,
    /// Subset of file-event kinds (see `vars::FILE_EVENTS` and the `dir_*`
    /// equivalents) this pattern reacts to.
    pub event_mask: Vec<String>,
}

impl FileEventPattern {
    pub fn new(
        name: impl Into<String>,
        triggering_path: impl Into<String>,
        recipe: impl Into<String>,
        triggering_file: impl Into<String>,
    ) -> Self {
        FileEventPattern {
            name: name.into(),
            triggering_path: triggering_path.into(),
            recipe: recipe.into(),
            triggering_file: triggering_file.into(),
            parameters: HashMap::new(),
            outputs: HashMap::new(),
            event_mask: crate::vars::FILE_EVENTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Validate name charset and non-empty required fields. Grounded on
    /// the base pattern's constructor-time checks: bad input is rejected
    /// as soon as the pattern is constructed, not at match time.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.triggering_path.is_empty() {
            return Err(Error::validation(&self.name, "triggering_path is empty"));
        }
        if self.recipe.is_empty() {
            return Err(Error::validation(&self.name, "recipe name is empty"));
        }
        if self.triggering_file.is_empty() {
            return Err(Error::validation(&self.name, "triggering_file is empty"));
        }
        if self.event_mask.is_empty() {
            return Err(Error::validation(&self.name, "event_mask is empty"));
        }
        for kind in &self.event_mask {
            if !crate::vars::FILE_EVENTS.contains(&kind.as_str())
                && !crate::vars::DIR_EVENTS.contains(&kind.as_str())
            {
                return Err(Error::validation(
                    &self.name,
                    format!("'{}' is not a recognised event kind", kind),
                ));
            }
        }
        Ok(())
    }

    /// Expand this pattern's swept parameters into the cartesian product
    /// of concrete parameter sets. A pattern with no sweeps yields a
    /// single parameter set.
    pub fn expand_parameter_sweeps(&self) -> Result<Vec<HashMap<String, serde_json::Value>>> {
        let mut fixed: HashMap<String, serde_json::Value> = HashMap::new();
        let mut sweep_axes: Vec<(String, Vec<f64>)> = Vec::new();

        for (key, value) in &self.parameters {
            match value {
                ParameterValue::Single(v) => {
                    fixed.insert(key.clone(), v.clone());
                }
                ParameterValue::Sweep(spec) => {
                    sweep_axes.push((key.clone(), spec.expand()?));
                }
            }
        }

        if sweep_axes.is_empty() {
            return Ok(vec![fixed]);
        }

        let mut combos: Vec<HashMap<String, serde_json::Value>> = vec![fixed];
        for (key, values) in sweep_axes {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for v in &values {
                    let mut extended = combo.clone();
                    extended.insert(key.clone(), serde_json::json!(v));
                    next.push(extended);
                }
            }
            combos = next;
        }
        Ok(combos)
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("<unnamed>", "name must not be empty"));
    }
    if !name.chars().all(|c| VALID_NAME_CHARS.contains(c)) {
        return Err(Error::validation(
            name,
            "name contains characters outside [A-Za-z0-9_-]",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_expands_inclusive_of_stop() {
        let sweep = SweepSpec {
            start: 0.0,
            stop: 1.0,
            jump: 0.25,
        };
        let values = sweep.expand().unwrap();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn sweep_rejects_zero_jump() {
        let sweep = SweepSpec {
            start: 0.0,
            stop: 1.0,
            jump: 0.0,
        };
        assert!(sweep.expand().is_err());
    }

    #[test]
    fn cartesian_product_count_matches_axis_sizes() {
        let mut pattern = FileEventPattern::new("p1", "in/*.txt", "r1", "infile");
        pattern.parameters.insert(
            "a".to_string(),
            ParameterValue::Sweep(SweepSpec {
                start: 0.0,
                stop: 2.0,
                jump: 1.0,
            }),
        );
        pattern.parameters.insert(
            "b".to_string(),
            ParameterValue::Sweep(SweepSpec {
                start: 10.0,
                stop: 10.0,
                jump: 1.0,
            }),
        );
        pattern.parameters.insert(
            "c".to_string(),
            ParameterValue::Single(serde_json::json!("fixed")),
        );

        let combos = pattern.expand_parameter_sweeps().unwrap();
        assert_eq!(combos.len(), 3);
        for combo in &combos {
            assert_eq!(combo["c"], serde_json::json!("fixed"));
            assert_eq!(combo["b"], serde_json::json!(10.0));
        }
    }

    #[test]
    fn name_validation_rejects_bad_chars() {
        assert!(validate_name("ok_name-1").is_ok());
        assert!(validate_name("bad name!").is_err());
        assert!(validate_name("").is_err());
    }
}
