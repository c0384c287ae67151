//! Events flow from an `EventSource` through the `Monitor`'s matching
//! algorithm to a `MatchedEvent` the Runner hands to a handler.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::rule::Rule;

/// A raw notification from an event source, before any matching has
/// happened. `time` is stamped by the source at emission, not by the
/// monitor on receipt.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: String,
    pub path: PathBuf,
    pub time: SystemTime,
    pub is_dir: bool,
    /// Content hash of `path` at emission time, when the source can
    /// cheaply compute one (used later for the idempotency guard).
    pub hash: Option<String>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        RawEvent {
            kind: kind.into(),
            path: path.into(),
            time: SystemTime::now(),
            is_dir,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

/// An event that matched one rule, ready for a handler. Carries the full
/// rule (not just its name) so the Runner can dispatch without needing
/// shared access back into the originating monitor's rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedEvent {
    pub kind: String,
    pub path: PathBuf,
    pub rule: Rule,
    pub time: f64,
    pub base_dir: PathBuf,
    pub hash: Option<String>,
}
