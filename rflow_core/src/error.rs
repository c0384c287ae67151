//! Error taxonomy for the crate. Every fallible operation returns a
//! variant of [`Error`] rather than panicking; `thiserror` derives the
//! `Display`/`std::error::Error` impls the way the rest of the corpus does.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed for '{name}': {reason}")]
    Validation { name: String, reason: String },

    #[error("rule '{rule}' could not be bound: {reason}")]
    Binding { rule: String, reason: String },

    #[error("inconsistent definitions: {0}")]
    Consistency(String),

    #[error("no handler or conductor could accept job '{job_id}'")]
    Routing { job_id: String },

    #[error("hash mismatch for '{}': file changed since the triggering event", path.display())]
    HashMismatch { path: PathBuf },

    #[error("interpreter failed for job '{job_id}': {reason}")]
    Interpreter { job_id: String, reason: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not acquire lock on '{}': {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn lock(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Lock {
            path: path.into(),
            source,
        }
    }

    pub fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn binding(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Binding {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
