//! A conductor advances a job directory from `queued` through `running`
//! to a terminal state, then hands it off to the output directory.
//! Grounded on the original `LocalPythonConductor.execute`: read under
//! lock, validate, mark running, invoke, mark terminal, move.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use logging_timer::{finish, stimer, Level};

use crate::error::{Error, Result};
use crate::io::{move_job_directory, threadsafe_read_job, threadsafe_update_job};
use crate::job::{Job, JobStatus, JobUpdate};
use crate::recipe::JobKind;
use crate::vars::BACKUP_JOB_ERROR_FILE;

/// Predicate a conductor applies to decide whether it will execute a
/// job, analogous to [`crate::handler::HandlerCriteria`] on the handler
/// side.
pub trait ConductorCriteria: Send + Sync {
    fn accepts(&self, job: &Job) -> bool;
}

pub struct JobKindConductorCriteria(pub JobKind);

impl ConductorCriteria for JobKindConductorCriteria {
    fn accepts(&self, job: &Job) -> bool {
        job.job_type == self.0
    }
}

/// The code-execution strategy for one job kind. The default
/// implementation shells out to an external command and gathers its
/// output the way the teacher's `gather_process_output` does; tests
/// substitute a stub that never spawns a process.
pub trait Interpreter: Send + Sync {
    fn run(&self, job_dir: &Path, job: &Job) -> std::result::Result<String, String>;
}

/// Runs `base.<ext>` through an external interpreter binary
/// (`python3`, `bash`, or a notebook runner), matching the teacher's
/// `duct`-based subprocess invocation.
pub struct ExternalInterpreter {
    pub python_bin: String,
    pub shell_bin: String,
    pub notebook_bin: String,
}

impl Default for ExternalInterpreter {
    fn default() -> Self {
        ExternalInterpreter {
            python_bin: "python3".to_string(),
            shell_bin: "bash".to_string(),
            notebook_bin: "jupyter".to_string(),
        }
    }
}

impl Interpreter for ExternalInterpreter {
    fn run(&self, job_dir: &Path, job: &Job) -> std::result::Result<String, String> {
        let ext = job.job_type.extension();
        let script_path = job_dir.join(format!("job.{}", ext));

        let expr = match job.job_type {
            JobKind::Script => duct::cmd!(&self.python_bin, &script_path),
            JobKind::Shell => duct::cmd!(&self.shell_bin, &script_path),
            JobKind::Notebook => duct::cmd!(
                &self.notebook_bin,
                "nbconvert",
                "--to",
                "notebook",
                "--execute",
                &script_path
            ),
        };

        expr.stderr_to_stdout()
            .read()
            .map_err(|e| format!("{} process failed: {}", job.job_type.extension(), e))
    }
}

pub struct Conductor {
    pub job_queue_dir: PathBuf,
    pub job_output_dir: PathBuf,
    pub pause_time_ms: u64,
    criteria: Box<dyn ConductorCriteria>,
    interpreter: Box<dyn Interpreter>,
}

impl Conductor {
    pub fn new(
        job_queue_dir: impl Into<PathBuf>,
        job_output_dir: impl Into<PathBuf>,
        pause_time_ms: u64,
        criteria: Box<dyn ConductorCriteria>,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        Conductor {
            job_queue_dir: job_queue_dir.into(),
            job_output_dir: job_output_dir.into(),
            pause_time_ms,
            criteria,
            interpreter,
        }
    }

    pub fn accepts(&self, job: &Job) -> bool {
        self.criteria.accepts(job)
    }

    /// Execute the job at `job_dir`, a path inside `job_queue_dir`, and
    /// move it into `job_output_dir` on any outcome, terminal or not.
    pub fn execute(&self, job_dir: &Path) -> Result<()> {
        let tmr = stimer!(Level::Info; "execute()", "{}", job_dir.display());

        let job = match self.read_and_mark_running(job_dir) {
            Ok(job) => job,
            Err(e) => {
                self.write_backup_error(job_dir, &e)?;
                let result = self.finish_move(job_dir);
                finish!(tmr, "aborted: malformed job");
                return result;
            }
        };

        if self.is_stale(job_dir, &job)? {
            let reason = Error::HashMismatch {
                path: job.event.path.clone(),
            };
            threadsafe_update_job(
                job_dir,
                JobUpdate {
                    status: JobStatus::Skipped,
                    end: Some(Utc::now()),
                    error: Some(reason.to_string()),
                    ..Default::default()
                },
            )?;
            info!("job {} skipped: {}", job.id, reason);
            let result = self.finish_move(job_dir);
            finish!(tmr, "skipped with status={:?}", JobStatus::Skipped);
            return result;
        }

        let final_status = match self.interpreter.run(job_dir, &job) {
            Ok(_stdout) => {
                threadsafe_update_job(
                    job_dir,
                    JobUpdate {
                        status: JobStatus::Done,
                        end: Some(Utc::now()),
                        ..Default::default()
                    },
                )?;
                info!("job {} completed", job.id);
                JobStatus::Done
            }
            Err(reason) => {
                threadsafe_update_job(
                    job_dir,
                    JobUpdate {
                        status: JobStatus::Failed,
                        end: Some(Utc::now()),
                        error: Some(format!("job execution failed. {}", reason)),
                        ..Default::default()
                    },
                )?;
                warn!("job {} failed: {}", job.id, reason);
                JobStatus::Failed
            }
        };

        let result = self.finish_move(job_dir);
        finish!(tmr, "completed with status={:?}", final_status);
        result
    }

    fn read_and_mark_running(&self, job_dir: &Path) -> Result<Job> {
        threadsafe_read_job(job_dir)?;
        threadsafe_update_job(
            job_dir,
            JobUpdate {
                status: JobStatus::Running,
                start: Some(Utc::now()),
                ..Default::default()
            },
        )
    }

    fn write_backup_error(&self, job_dir: &Path, e: &Error) -> Result<()> {
        let path = job_dir.join(BACKUP_JOB_ERROR_FILE);
        let contents = format!("received incorrectly set up job.\n\n{}", e);
        fs::write(&path, contents).map_err(|io_err| Error::io(&path, io_err))
    }

    fn finish_move(&self, job_dir: &Path) -> Result<()> {
        let job_id = job_dir
            .file_name()
            .ok_or_else(|| Error::Consistency("job directory has no file name".to_string()))?;
        let dest = self.job_output_dir.join(job_id);
        move_job_directory(job_dir, &dest)
    }

    /// Re-hash the triggering file and compare against the hash recorded
    /// at event time; a mismatch means a newer event already scheduled a
    /// replacement job, so this one is skipped rather than executed.
    fn is_stale(&self, _job_dir: &Path, job: &Job) -> Result<bool> {
        let recorded_hash = match &job.hash.clone().or_else(|| job.event.hash.clone()) {
            Some(h) => h.clone(),
            None => return Ok(false),
        };
        let current = match fs::read(&job.event.path) {
            Ok(bytes) => crate::hashing::hash_bytes(&bytes),
            Err(_) => return Ok(true),
        };
        Ok(current != recorded_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobEvent;
    use std::collections::HashMap;

    struct StubInterpreter {
        output: std::result::Result<String, String>,
    }

    impl Interpreter for StubInterpreter {
        fn run(&self, _job_dir: &Path, _job: &Job) -> std::result::Result<String, String> {
            self.output.clone()
        }
    }

    fn make_job_dir(job: &Job) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        crate::io::threadsafe_write_job(dir.path(), job).unwrap();
        dir
    }

    fn sample_job(triggering_path: &Path, hash: Option<String>) -> Job {
        Job::new(
            JobEvent {
                kind: "file_created".to_string(),
                path: triggering_path.to_path_buf(),
                hash: hash.clone(),
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
    fn successful_execution_moves_to_output_and_marks_done() {
        let src = tempfile::tempdir().unwrap();
        let file_path = src.path().join("a.txt");
        fs::write(&file_path, b"hello").unwrap();
        let hash = crate::hashing::hash_bytes(b"hello");

        let job = sample_job(&file_path, Some(hash));
        let queue_root = tempfile::tempdir().unwrap();
        let output_root = tempfile::tempdir().unwrap();
        let job_dir = queue_root.path().join(&job.id);
        fs::create_dir_all(&job_dir).unwrap();
        crate::io::threadsafe_write_job(&job_dir, &job).unwrap();

        let conductor = Conductor::new(
            queue_root.path(),
            output_root.path(),
            50,
            Box::new(JobKindConductorCriteria(JobKind::Shell)),
            Box::new(StubInterpreter {
                output: Ok("done".to_string()),
            }),
        );

        conductor.execute(&job_dir).unwrap();

        let final_dir = output_root.path().join(&job.id);
        assert!(final_dir.exists());
        let final_job = crate::io::threadsafe_read_job(&final_dir).unwrap();
        assert_eq!(final_job.status, JobStatus::Done);
    }

    #[test]
    fn stale_triggering_file_is_skipped_not_executed() {
        let src = tempfile::tempdir().unwrap();
        let file_path = src.path().join("a.txt");
        fs::write(&file_path, b"original").unwrap();
        let stale_hash = crate::hashing::hash_bytes(b"original-but-different");

        let job = sample_job(&file_path, Some(stale_hash));
        let queue_root = tempfile::tempdir().unwrap();
        let output_root = tempfile::tempdir().unwrap();
        let job_dir = queue_root.path().join(&job.id);
        fs::create_dir_all(&job_dir).unwrap();
        crate::io::threadsafe_write_job(&job_dir, &job).unwrap();

        let conductor = Conductor::new(
            queue_root.path(),
            output_root.path(),
            50,
            Box::new(JobKindConductorCriteria(JobKind::Shell)),
            Box::new(StubInterpreter {
                output: Err("should not run".to_string()),
            }),
        );

        conductor.execute(&job_dir).unwrap();

        let final_dir = output_root.path().join(&job.id);
        let final_job = crate::io::threadsafe_read_job(&final_dir).unwrap();
        assert_eq!(final_job.status, JobStatus::Skipped);
    }
}
