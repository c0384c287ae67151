//! The job is the materialised unit of work: the on-disk record a
//! handler creates and a conductor advances through to a terminal state.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::recipe::JobKind;
use crate::vars::{STATUS_DONE, STATUS_FAILED, STATUS_QUEUED, STATUS_RUNNING, STATUS_SKIPPED};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// In-memory only; never persisted.
    Creating,
    Queued,
    Running,
    Done,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Creating => "creating",
            JobStatus::Queued => STATUS_QUEUED,
            JobStatus::Running => STATUS_RUNNING,
            JobStatus::Done => STATUS_DONE,
            JobStatus::Failed => STATUS_FAILED,
            JobStatus::Skipped => STATUS_SKIPPED,
        }
    }
}

/// The event a job was created in response to, cut down to the fields
/// worth persisting alongside the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: String,
    pub path: PathBuf,
    pub hash: Option<String>,
}

/// The full `job.yml` record. Required keys per the on-disk schema:
/// `id, event, job_type, pattern, recipe, rule, status, create,
/// requirements`; `start`/`end`/`error`/`parameters`/`hash` are added as
/// the job progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub event: JobEvent,
    pub job_type: JobKind,
    pub pattern: String,
    pub recipe: String,
    pub rule: String,
    pub status: JobStatus,
    pub create: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Job {
    pub fn new(
        event: JobEvent,
        job_type: JobKind,
        pattern: impl Into<String>,
        recipe: impl Into<String>,
        rule: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        requirements: HashMap<String, serde_json::Value>,
    ) -> Self {
        let hash = event.hash.clone();
        Job {
            id: generate_job_id(),
            event,
            job_type,
            pattern: pattern.into(),
            recipe: recipe.into(),
            rule: rule.into(),
            status: JobStatus::Queued,
            create: Utc::now(),
            start: None,
            end: None,
            error: None,
            parameters,
            requirements,
            hash,
        }
    }

    /// Merge a status transition into this job, enforcing that terminal
    /// states are never overwritten, existing timestamps are preserved,
    /// and errors accumulate rather than replace.
    pub fn apply_update(&mut self, update: JobUpdate) {
        if self.status.is_terminal() {
            return;
        }
        self.status = update.status;
        if self.start.is_none() {
            if let Some(start) = update.start {
                self.start = Some(start);
            }
        }
        if self.end.is_none() {
            if let Some(end) = update.end {
                self.end = Some(end);
            }
        }
        if let Some(new_error) = update.error {
            self.error = Some(match self.error.take() {
                Some(existing) => format!("{}\n{}", existing, new_error),
                None => new_error,
            });
        }
    }
}

/// A proposed change to a job's status, as applied by
/// [`Job::apply_update`].
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Creating
    }
}

/// A random, namespaced job id. Grounded on the teacher's atomic-counter
/// `JobId`, generalised to a random id since jobs here are created
/// concurrently by independent handlers with no shared counter.
pub fn generate_job_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("job-{:016x}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            JobEvent {
                kind: "file_created".to_string(),
                path: PathBuf::from("/base/in/a.txt"),
                hash: Some("abc".to_string()),
            },
            JobKind::Shell,
            "p1",
            "r1",
            "rule-1",
            HashMap::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn terminal_status_is_never_overwritten() {
        let mut job = sample_job();
        job.apply_update(JobUpdate {
            status: JobStatus::Done,
            end: Some(Utc::now()),
            ..Default::default()
        });
        let stuck_at_done = job.clone();

        job.apply_update(JobUpdate {
            status: JobStatus::Failed,
            error: Some("late failure".to_string()),
            ..Default::default()
        });

        assert_eq!(job.status, stuck_at_done.status);
    }

    #[test]
    fn timestamps_are_preserved_once_set() {
        let mut job = sample_job();
        let first_start = Utc::now();
        job.apply_update(JobUpdate {
            status: JobStatus::Running,
            start: Some(first_start),
            ..Default::default()
        });

        job.apply_update(JobUpdate {
            status: JobStatus::Running,
            start: Some(first_start + chrono::Duration::seconds(5)),
            ..Default::default()
        });

        assert_eq!(job.start, Some(first_start));
    }

    #[test]
    fn errors_accumulate_rather_than_replace() {
        let mut job = sample_job();
        job.apply_update(JobUpdate {
            status: JobStatus::Running,
            error: Some("warning one".to_string()),
            ..Default::default()
        });
        job.apply_update(JobUpdate {
            status: JobStatus::Failed,
            error: Some("fatal".to_string()),
            ..Default::default()
        });

        assert_eq!(job.error.as_deref(), Some("warning one\nfatal"));
    }
}
