//! A rule is the cartesian pairing of a pattern with the recipe its
//! `recipe` field names. Rules are derived, never constructed freely by
//! callers, and are re-derived whenever the owning monitor's pattern or
//! recipe collections change.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::FileEventPattern;
use crate::recipe::Recipe;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub pattern: FileEventPattern,
    pub recipe: Recipe,
}

impl Rule {
    /// Bind a pattern to its recipe, failing with a binding error unless
    /// `pattern.recipe == recipe.name`.
    pub fn new(pattern: FileEventPattern, recipe: Recipe) -> Result<Self> {
        if pattern.recipe != recipe.name {
            return Err(Error::binding(
                &pattern.name,
                format!(
                    "pattern references recipe '{}' but was paired with '{}'",
                    pattern.recipe, recipe.name
                ),
            ));
        }
        let name = generate_rule_name(&pattern.name, &recipe.name);
        Ok(Rule {
            name,
            pattern,
            recipe,
        })
    }
}

fn generate_rule_name(pattern_name: &str, recipe_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("rule-{}-{}-{:08x}", pattern_name, recipe_name, suffix)
}

/// Derive the full rule set from a pattern map and a recipe map, keyed by
/// their own `name` field (a consistency error if the key disagrees with
/// the value's name). For each pattern whose `recipe` field matches a
/// known recipe, exactly one rule is created; patterns naming an unknown
/// recipe are skipped rather than treated as an error, mirroring a
/// manifest that declares recipes incrementally.
pub fn derive_rules(
    patterns: &HashMap<String, FileEventPattern>,
    recipes: &HashMap<String, Recipe>,
) -> Result<HashMap<String, Rule>> {
    for (key, pattern) in patterns {
        if key != &pattern.name {
            return Err(Error::Consistency(format!(
                "pattern map key '{}' does not match pattern name '{}'",
                key, pattern.name
            )));
        }
    }
    for (key, recipe) in recipes {
        if key != &recipe.name {
            return Err(Error::Consistency(format!(
                "recipe map key '{}' does not match recipe name '{}'",
                key, recipe.name
            )));
        }
    }

    let mut rules = HashMap::new();
    for pattern in patterns.values() {
        if let Some(recipe) = recipes.get(&pattern.recipe) {
            let rule = Rule::new(pattern.clone(), recipe.clone())?;
            rules.insert(rule.name.clone(), rule);
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::RecipeBody;

    fn sample_pattern(recipe: &str) -> FileEventPattern {
        FileEventPattern::new("p1", "in/*.txt", recipe, "infile")
    }

    fn sample_recipe(name: &str) -> Recipe {
        Recipe::new(
            name,
            RecipeBody::Shell {
                source: "echo hi".to_string(),
            },
        )
    }

    #[test]
    fn rule_invariant_holds() {
        let rule = Rule::new(sample_pattern("r1"), sample_recipe("r1")).unwrap();
        assert_eq!(rule.pattern.recipe, rule.recipe.name);
    }

    #[test]
    fn mismatched_recipe_name_is_binding_error() {
        let result = Rule::new(sample_pattern("r1"), sample_recipe("r2"));
        assert!(matches!(result, Err(Error::Binding { .. })));
    }

    #[test]
    fn derive_rules_skips_patterns_with_unknown_recipe() {
        let mut patterns = HashMap::new();
        patterns.insert("p1".to_string(), sample_pattern("missing"));
        let recipes = HashMap::new();

        let rules = derive_rules(&patterns, &recipes).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn derive_rules_rejects_key_name_mismatch() {
        let mut patterns = HashMap::new();
        patterns.insert("wrong-key".to_string(), sample_pattern("r1"));
        let mut recipes = HashMap::new();
        recipes.insert("r1".to_string(), sample_recipe("r1"));

        let result = derive_rules(&patterns, &recipes);
        assert!(matches!(result, Err(Error::Consistency(_))));
    }
}
