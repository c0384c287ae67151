//! The Monitor owns a set of rules and matches raw events against them,
//! emitting [`MatchedEvent`]s downstream. Grounded on the original
//! `WatchdogMonitor`/`WatchdogEventHandler` pair: a settle policy
//! de-duplicates bursts, then a rules mutex guards both a recursive and
//! a direct glob match per candidate rule.

pub mod event_source;

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use logging_timer::{finish, stimer, Level};
use regex::Regex;

use crate::error::{Error, Result};
use crate::event::{MatchedEvent, RawEvent};
use crate::pattern::FileEventPattern;
use crate::recipe::Recipe;
use crate::rule::{derive_rules, Rule};

pub use event_source::{EventSource, ScriptedEventSource, WatchexecEventSource};

/// Coalesces bursts of events on the same path inside `settle_time`.
/// A second event within the window updates the remembered timestamp
/// and is dropped rather than forwarded.
struct SettlePolicy {
    settle_time_secs: f64,
    recent: Mutex<HashMap<std::path::PathBuf, f64>>,
}

impl SettlePolicy {
    fn new(settle_time_secs: f64) -> Self {
        SettlePolicy {
            settle_time_secs,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the event should be forwarded, `false` if it
    /// was coalesced into a prior one.
    fn accept(&self, path: &std::path::Path, time: f64) -> bool {
        let mut recent = self.recent.lock().unwrap();
        match recent.get(path) {
            Some(&last_seen) if (time - last_seen).abs() <= self.settle_time_secs => {
                recent.insert(path.to_path_buf(), time.max(last_seen));
                false
            }
            _ => {
                recent.insert(path.to_path_buf(), time);
                true
            }
        }
    }
}

fn to_unix_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Compiles a glob-style `triggering_path` into both a recursive regex
/// (`*` crosses path separators) and a direct regex (it doesn't), the
/// same pair the original computes from a single `fnmatch.translate`
/// result by swapping `.*` for `[^/]*`.
struct CompiledGlob {
    recursive: Regex,
    direct: Regex,
}

fn compile_glob(glob: &str) -> Result<CompiledGlob> {
    let mut recursive_pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => recursive_pattern.push_str(".*"),
            '?' => recursive_pattern.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                recursive_pattern.push('\\');
                recursive_pattern.push(c);
            }
            other => recursive_pattern.push(other),
        }
    }
    recursive_pattern.push('$');

    let direct_pattern = recursive_pattern.replace(".*", "[^/]*");

    let recursive = Regex::new(&recursive_pattern)
        .map_err(|e| Error::validation(glob, format!("invalid glob: {}", e)))?;
    let direct = Regex::new(&direct_pattern)
        .map_err(|e| Error::validation(glob, format!("invalid glob: {}", e)))?;
    Ok(CompiledGlob { recursive, direct })
}

pub struct Monitor {
    base_dir: std::path::PathBuf,
    rules: Arc<Mutex<HashMap<String, Rule>>>,
    patterns: Arc<Mutex<HashMap<String, FileEventPattern>>>,
    recipes: Arc<Mutex<HashMap<String, Recipe>>>,
    settle: Arc<SettlePolicy>,
    source: Box<dyn EventSource>,
}

impl Monitor {
    pub fn new(
        base_dir: impl Into<std::path::PathBuf>,
        patterns: HashMap<String, FileEventPattern>,
        recipes: HashMap<String, Recipe>,
        settle_time_secs: f64,
        source: Box<dyn EventSource>,
    ) -> Result<Self> {
        let rules = derive_rules(&patterns, &recipes)?;
        Ok(Monitor {
            base_dir: base_dir.into(),
            rules: Arc::new(Mutex::new(rules)),
            patterns: Arc::new(Mutex::new(patterns)),
            recipes: Arc::new(Mutex::new(recipes)),
            settle: Arc::new(SettlePolicy::new(settle_time_secs)),
            source,
        })
    }

    pub fn get_patterns(&self) -> HashMap<String, FileEventPattern> {
        self.patterns.lock().unwrap().clone()
    }

    pub fn get_recipes(&self) -> HashMap<String, Recipe> {
        self.recipes.lock().unwrap().clone()
    }

    pub fn get_rules(&self) -> HashMap<String, Rule> {
        self.rules.lock().unwrap().clone()
    }

    fn re_derive_rules(&self) -> Result<()> {
        let patterns = self.patterns.lock().unwrap();
        let recipes = self.recipes.lock().unwrap();
        let new_rules = derive_rules(&patterns, &recipes)?;
        *self.rules.lock().unwrap() = new_rules;
        Ok(())
    }

    pub fn add_pattern(&self, pattern: FileEventPattern) -> Result<()> {
        pattern.validate()?;
        self.patterns.lock().unwrap().insert(pattern.name.clone(), pattern);
        self.re_derive_rules()
    }

    pub fn remove_pattern(&self, name: &str) -> Result<()> {
        self.patterns.lock().unwrap().remove(name);
        self.re_derive_rules()
    }

    pub fn add_recipe(&self, recipe: Recipe) -> Result<()> {
        recipe.validate()?;
        self.recipes.lock().unwrap().insert(recipe.name.clone(), recipe);
        self.re_derive_rules()
    }

    pub fn remove_recipe(&self, name: &str) -> Result<()> {
        self.recipes.lock().unwrap().remove(name);
        self.re_derive_rules()
    }

    /// Register with the event source and begin matching events onto
    /// `out`. Returns once the source has started; matching itself runs
    /// on a worker thread reading the source's internal channel.
    pub fn start(&mut self, out: Sender<MatchedEvent>) -> Result<()> {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<RawEvent>();
        self.source.start(raw_tx)?;

        let rules = Arc::clone(&self.rules);
        let settle = Arc::clone(&self.settle);
        let base_dir = self.base_dir.clone();

        std::thread::Builder::new()
            .name("Monitor".into())
            .spawn(move || {
                for raw in raw_rx {
                    if let Err(e) = match_one(&base_dir, &rules, &settle, raw, &out) {
                        warn!("monitor match failed: {}", e);
                    }
                }
            })
            .expect("cannot spawn monitor matching thread");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.source.stop();
    }
}

fn match_one(
    base_dir: &std::path::Path,
    rules: &Arc<Mutex<HashMap<String, Rule>>>,
    settle: &SettlePolicy,
    raw: RawEvent,
    out: &Sender<MatchedEvent>,
) -> Result<()> {
    let tmr = stimer!(Level::Debug; "match_one()", "{}", raw.path.display());

    let prefixed_kind = if raw.is_dir {
        format!("dir_{}", strip_event_prefix(&raw.kind))
    } else {
        format!("file_{}", strip_event_prefix(&raw.kind))
    };

    let time = to_unix_secs(raw.time);
    if !settle.accept(&raw.path, time) {
        finish!(tmr, "settled, dropping");
        return Ok(());
    }

    let rel_path = raw
        .path
        .strip_prefix(base_dir)
        .unwrap_or(&raw.path)
        .to_string_lossy()
        .trim_start_matches(std::path::MAIN_SEPARATOR)
        .to_string();

    let mut hits = 0usize;
    let rules = rules.lock().unwrap();
    for rule in rules.values() {
        if !rule.pattern.event_mask.contains(&prefixed_kind) {
            continue;
        }
        let compiled = compile_glob(&rule.pattern.triggering_path)?;
        if compiled.recursive.is_match(&rel_path) || compiled.direct.is_match(&rel_path) {
            info!(
                "event at {} of type {} hit rule {}",
                raw.path.display(),
                prefixed_kind,
                rule.name
            );
            hits += 1;
            let matched = MatchedEvent {
                kind: prefixed_kind.clone(),
                path: raw.path.clone(),
                rule: rule.clone(),
                time,
                base_dir: base_dir.to_path_buf(),
                hash: raw.hash.clone(),
            };
            if out.send(matched).is_err() {
                warn!("runner channel closed; dropping matched event for {}", raw.path.display());
            }
        }
    }
    finish!(tmr, "matched {} rule{}", hits, crate::utils::plural_s(hits));
    Ok(())
}

fn strip_event_prefix(kind: &str) -> &str {
    kind.trim_start_matches("file_").trim_start_matches("dir_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawEvent;
    use crate::recipe::RecipeBody;
    use std::sync::mpsc::channel;

    fn recipe(name: &str) -> Recipe {
        Recipe::new(
            name,
            RecipeBody::Shell {
                source: "echo hi".to_string(),
            },
        )
    }

    fn pattern(name: &str, triggering_path: &str, recipe: &str) -> FileEventPattern {
        let mut p = FileEventPattern::new(name, triggering_path, recipe, "infile");
        p.event_mask = vec!["file_created".to_string()];
        p
    }

    #[test]
    fn direct_and_recursive_glob_both_match_expected_paths() {
        let compiled = compile_glob("start/*.txt").unwrap();
        assert!(compiled.direct.is_match("start/a.txt"));
        assert!(compiled.recursive.is_match("start/nested/a.txt"));
        assert!(!compiled.direct.is_match("start/nested/a.txt"));
    }

    #[test]
    fn settle_policy_drops_second_event_within_window() {
        let settle = SettlePolicy::new(1.0);
        let path = std::path::PathBuf::from("/base/a.txt");
        assert!(settle.accept(&path, 100.0));
        assert!(!settle.accept(&path, 100.5));
        assert!(settle.accept(&path, 102.0));
    }

    #[test]
    fn matched_event_emitted_for_single_file_pattern() {
        let mut patterns = HashMap::new();
        patterns.insert("p1".to_string(), pattern("p1", "start/*.txt", "r1"));
        let mut recipes = HashMap::new();
        recipes.insert("r1".to_string(), recipe("r1"));

        let mut source = ScriptedEventSource::new();
        source.push(RawEvent::new("created", "/base/start/a.txt", false));

        let mut monitor = Monitor::new("/base", patterns, recipes, 1.0, Box::new(source)).unwrap();
        let (tx, rx) = channel();
        monitor.start(tx).unwrap();

        let matched = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(matched.rule.name.starts_with("rule-p1-r1-"), true);
    }
}
