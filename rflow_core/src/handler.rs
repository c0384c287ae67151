//! A handler turns a matched event into one or more queued jobs. It owns
//! the job queue directory and is consulted by the Runner through a
//! criteria predicate before being asked to `handle` an event.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::event::MatchedEvent;
use crate::io::threadsafe_write_job;
use crate::job::{Job, JobEvent};
use crate::recipe::{JobKind, Recipe};
use crate::rule::Rule;
use crate::utils::replace_keywords;
use crate::vars::{META_FILE, PARAMS_FILE};

/// Predicate a handler applies to decide whether it will accept an
/// event. The Runner tries handlers in turn and stops at the first
/// acceptance.
pub trait HandlerCriteria: Send + Sync {
    fn accepts(&self, event: &MatchedEvent, rule: &Rule) -> bool;
}

/// Accepts any event whose rule's recipe is of the given job kind.
pub struct JobKindCriteria(pub JobKind);

impl HandlerCriteria for JobKindCriteria {
    fn accepts(&self, _event: &MatchedEvent, rule: &Rule) -> bool {
        rule.recipe.job_kind() == self.0
    }
}

pub struct Handler {
    pub job_queue_dir: PathBuf,
    pub pause_time_ms: u64,
    criteria: Box<dyn HandlerCriteria>,
}

impl Handler {
    pub fn new(
        job_queue_dir: impl Into<PathBuf>,
        pause_time_ms: u64,
        criteria: Box<dyn HandlerCriteria>,
    ) -> Self {
        Handler {
            job_queue_dir: job_queue_dir.into(),
            pause_time_ms,
            criteria,
        }
    }

    pub fn accepts(&self, event: &MatchedEvent, rule: &Rule) -> bool {
        self.criteria.accepts(event, rule)
    }

    /// Build the base parameter dictionary, expand sweeps, allocate one
    /// job per concrete assignment, expand keywords, and persist each
    /// job directory. Returns the path of every job directory created,
    /// in creation order, for the Runner to forward to a conductor.
    pub fn handle(&self, event: &MatchedEvent, rule: &Rule) -> Result<Vec<PathBuf>> {
        let mut base_params: HashMap<String, serde_json::Value> = HashMap::new();
        for (k, v) in &rule.pattern.parameters {
            let value = match v {
                crate::pattern::ParameterValue::Single(value) => value.clone(),
                crate::pattern::ParameterValue::Sweep(_) => continue,
            };
            base_params.insert(k.clone(), value);
        }
        for (k, v) in &rule.pattern.outputs {
            base_params.insert(k.clone(), serde_json::json!(v));
        }
        base_params.insert(
            rule.pattern.triggering_file.clone(),
            serde_json::json!(event.path.to_string_lossy()),
        );

        let combos = rule.pattern.expand_parameter_sweeps()?;
        let mut created = Vec::with_capacity(combos.len().max(1));

        for combo in combos {
            let mut params = base_params.clone();
            params.extend(combo);

            let job_dir = self.create_job(event, rule, params)?;
            created.push(job_dir);
        }

        info!(
            "handler created {} job{} for rule {}",
            created.len(),
            crate::utils::plural_s(created.len()),
            rule.name
        );
        Ok(created)
    }

    fn create_job(
        &self,
        event: &MatchedEvent,
        rule: &Rule,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<PathBuf> {
        let job_event = JobEvent {
            kind: event.kind.clone(),
            path: event.path.clone(),
            hash: event.hash.clone(),
        };

        let mut job = Job::new(
            job_event,
            rule.recipe.job_kind(),
            rule.pattern.name.clone(),
            rule.recipe.name.clone(),
            rule.name.clone(),
            HashMap::new(),
            rule.recipe.requirements.clone(),
        );

        let expanded = replace_keywords(&params, &job.id, &event.path, &event.base_dir);
        job.parameters = expanded;

        let job_dir = self.job_queue_dir.join(&job.id);
        fs::create_dir_all(&job_dir).map_err(|e| Error::io(&job_dir, e))?;

        self.write_base_file(&job_dir, &rule.recipe)?;
        self.write_params_file(&job_dir, &job.parameters)?;
        threadsafe_write_job(&job_dir, &job)?;

        Ok(job_dir)
    }

    fn write_base_file(&self, job_dir: &Path, recipe: &Recipe) -> Result<()> {
        let ext = recipe.job_kind().extension();
        let path = job_dir.join(format!("base.{}", ext));
        let contents = recipe.body.to_base_file_contents()?;
        fs::write(&path, contents).map_err(|e| Error::io(&path, e))
    }

    fn write_params_file(
        &self,
        job_dir: &Path,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let path = job_dir.join(PARAMS_FILE);
        let contents = serde_yaml::to_string(parameters)?;
        fs::write(&path, contents).map_err(|e| Error::io(&path, e))
    }
}

/// A routing error raised when no handler's criteria accepts an event;
/// the Runner logs this and moves on.
pub fn routing_error(event: &MatchedEvent) -> Error {
    Error::Routing {
        job_id: format!("<unassigned for {}>", event.path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{FileEventPattern, ParameterValue, SweepSpec};
    use crate::recipe::{Recipe, RecipeBody};

    fn sample_rule_with_sweep() -> Rule {
        let mut pattern = FileEventPattern::new("p1", "start/*.txt", "r1", "infile");
        pattern.outputs.insert("outdir".to_string(), "output".to_string());
        pattern.parameters.insert(
            "amplitude".to_string(),
            ParameterValue::Sweep(SweepSpec {
                start: 0.0,
                stop: 20000.0,
                jump: 5000.0,
            }),
        );
        let recipe = Recipe::new(
            "r1",
            RecipeBody::Shell {
                source: "echo {FILENAME}".to_string(),
            },
        );
        Rule::new(pattern, recipe).unwrap()
    }

    #[test]
    fn handle_creates_one_job_per_sweep_value() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Handler::new(dir.path(), 100, Box::new(JobKindCriteria(JobKind::Shell)));
        let rule = sample_rule_with_sweep();

        let event = MatchedEvent {
            kind: "file_created".to_string(),
            path: PathBuf::from("/base/start/A.txt"),
            rule: rule.clone(),
            time: 0.0,
            base_dir: PathBuf::from("/base"),
            hash: Some("abc".to_string()),
        };

        let job_dirs = handler.handle(&event, &rule).unwrap();
        assert_eq!(job_dirs.len(), 5);
        for job_dir in &job_dirs {
            assert!(job_dir.join(META_FILE).exists());
            assert!(job_dir.join(PARAMS_FILE).exists());
            assert!(job_dir.join("base.sh").exists());
        }
    }

    #[test]
    fn criteria_rejects_mismatched_job_kind() {
        let criteria = JobKindCriteria(JobKind::Notebook);
        let rule = sample_rule_with_sweep();
        let event = MatchedEvent {
            kind: "file_created".to_string(),
            path: PathBuf::from("/base/start/A.txt"),
            rule: rule.clone(),
            time: 0.0,
            base_dir: PathBuf::from("/base"),
            hash: None,
        };
        assert!(!criteria.accepts(&event, &rule));
    }
}
