//! Crash-safe reads/writes of a job's `job.yml`, guarded by an advisory
//! file lock. Grounded on the original system's `threadsafe_read_status`/
//! `write_status`/`update_status` trio: every mutation is a
//! read-under-lock, merge, write, unlock cycle so concurrent conductors
//! never interleave partial writes.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::warn;

use crate::error::{Error, Result};
use crate::job::{Job, JobUpdate};
use crate::vars::{LOCK_EXT, META_FILE};

fn lock_path(job_dir: &Path) -> PathBuf {
    job_dir.join(format!("{}{}", META_FILE, LOCK_EXT))
}

fn meta_path(job_dir: &Path) -> PathBuf {
    job_dir.join(META_FILE)
}

/// Hold the advisory lock for the lifetime of the guard; dropping it
/// unlocks. A missing lock file is created on first use.
struct LockGuard {
    file: File,
}

impl LockGuard {
    fn acquire(job_dir: &Path) -> Result<Self> {
        let path = lock_path(job_dir);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::lock(&path, e))?;
        file.lock_exclusive().map_err(|e| Error::lock(&path, e))?;
        Ok(LockGuard { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to release job lock: {}", e);
        }
    }
}

/// Read `job.yml` under the advisory lock.
pub fn threadsafe_read_job(job_dir: &Path) -> Result<Job> {
    let _guard = LockGuard::acquire(job_dir)?;
    read_job_unlocked(job_dir)
}

fn read_job_unlocked(job_dir: &Path) -> Result<Job> {
    let path = meta_path(job_dir);
    let contents = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let job: Job = serde_yaml::from_str(&contents)?;
    Ok(job)
}

/// Write `job.yml` under the advisory lock. Used for the initial,
/// uncontended write when a handler first creates the job directory.
pub fn threadsafe_write_job(job_dir: &Path, job: &Job) -> Result<()> {
    let _guard = LockGuard::acquire(job_dir)?;
    write_job_unlocked(job_dir, job)
}

fn write_job_unlocked(job_dir: &Path, job: &Job) -> Result<()> {
    let path = meta_path(job_dir);
    let contents = serde_yaml::to_string(job)?;
    fs::write(&path, contents).map_err(|e| Error::io(&path, e))?;
    Ok(())
}

/// Read-modify-write `job.yml` under a single lock acquisition: read the
/// current job, apply `update` (which itself enforces the
/// never-overwrite-terminal / preserve-timestamps / concatenate-errors
/// rules), write the result back.
pub fn threadsafe_update_job(job_dir: &Path, update: JobUpdate) -> Result<Job> {
    let _guard = LockGuard::acquire(job_dir)?;
    let mut job = read_job_unlocked(job_dir)?;
    job.apply_update(update);
    write_job_unlocked(job_dir, &job)?;
    Ok(job)
}

/// Atomically hand a job directory off from the queue to the output
/// tree. A plain `rename` is atomic within one filesystem, matching the
/// original's `shutil.move` of a same-filesystem directory.
pub fn move_job_directory(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::rename(from, to).map_err(|e| Error::io(from, e))
}
