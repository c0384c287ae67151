//! Event sources emit [`RawEvent`]s into a monitor. The reference
//! implementation wraps `watchexec`, grounded on the teacher's
//! `source_directory_watcher.rs`; tests substitute a scripted in-memory
//! source so matching logic can be exercised without touching a real
//! filesystem watch.

use std::collections::{hash_map::Entry, HashMap};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use log::info;
use watchexec::cli::ArgsBuilder;
use watchexec::pathop::PathOp;
use watchexec::{Args, Handler as WatchexecHandler};

use crate::event::RawEvent;
use crate::utils::plural_s;
use crate::vars::{DIR_CREATE_EVENT, DIR_DELETED_EVENT, FILE_CREATE_EVENT, FILE_DELETED_EVENT, FILE_MODIFY_EVENT};

/// A capability a Monitor depends on to receive file-system notifications.
/// Expressed as a trait so a scripted/in-memory source can stand in for
/// the real watch in tests without touching the Monitor.
pub trait EventSource: Send {
    /// Start emitting events onto `sender`. Returns once registered;
    /// emission itself happens on a background thread.
    fn start(&mut self, sender: Sender<RawEvent>) -> crate::error::Result<()>;

    /// Stop emitting events. Best-effort; the reference `watchexec`
    /// backend has no clean unregister hook, so this is a no-op there.
    fn stop(&mut self) {}
}

/// Ignore list taken from the teacher's `get_args`: editor swap files,
/// VCS metadata, and other noise that is never a meaningful job trigger.
fn default_ignores() -> Vec<String> {
    vec![
        ".goutputstream*".into(),
        format!("*{}.DS_Store", MAIN_SEPARATOR),
        "*.sw?".into(),
        "*.sw?x".into(),
        "#*#".into(),
        ".#*".into(),
        ".*.kate-swp".into(),
        format!("*{s}.hg{s}**", s = MAIN_SEPARATOR),
        format!("*{s}.git{s}**", s = MAIN_SEPARATOR),
        format!("*{s}.svn{s}**", s = MAIN_SEPARATOR),
    ]
}

/// Watches a base directory recursively using `watchexec`, translating
/// its path-operation events into [`RawEvent`]s.
pub struct WatchexecEventSource {
    base_dir: PathBuf,
    debounce_ms: u64,
}

impl WatchexecEventSource {
    pub fn new(base_dir: impl Into<PathBuf>, debounce_ms: u64) -> Self {
        WatchexecEventSource {
            base_dir: base_dir.into(),
            debounce_ms,
        }
    }

    fn build_args(&self) -> Args {
        ArgsBuilder::default()
            .cmd(vec!["".into()])
            .paths(vec![self.base_dir.clone()])
            .ignores(default_ignores())
            .run_initially(false)
            .debounce(self.debounce_ms)
            .build()
            .expect("construction of watchexec Args failed")
    }
}

impl EventSource for WatchexecEventSource {
    fn start(&mut self, sender: Sender<RawEvent>) -> crate::error::Result<()> {
        let args = self.build_args();
        let handler = RawEventHandler {
            args,
            sender,
            base_dir: Arc::new(self.base_dir.clone()),
        };

        thread::Builder::new()
            .name("EventSource".into())
            .spawn(move || {
                if let Err(e) = watchexec::run::watch(&handler) {
                    log::warn!("event source watch loop exited: {}", e);
                }
            })
            .expect("cannot spawn event source background thread");
        info!("event source watching {}", self.base_dir.display());
        Ok(())
    }
}

struct RawEventHandler {
    args: Args,
    sender: Sender<RawEvent>,
    base_dir: Arc<PathBuf>,
}

impl RawEventHandler {
    fn classify(path: &Path, op_type: watchexec::pathop::Op) -> Option<&'static str> {
        let is_dir = path.is_dir();
        if PathOp::is_remove(op_type) {
            return Some(if is_dir { DIR_DELETED_EVENT } else { FILE_DELETED_EVENT });
        }
        if PathOp::is_create(op_type) {
            return Some(if is_dir { DIR_CREATE_EVENT } else { FILE_CREATE_EVENT });
        }
        if PathOp::is_write(op_type) || PathOp::is_rename(op_type) {
            return Some(FILE_MODIFY_EVENT);
        }
        None
    }

    fn send(&self, path: &Path, op_type: watchexec::pathop::Op) {
        if let Some(kind) = Self::classify(path, op_type) {
            let is_dir = kind.starts_with("dir_");
            let mut event = RawEvent::new(kind, path.to_path_buf(), is_dir);

            // Hash now, while the triggering file is presumed to still
            // hold the content that caused this event, so a conductor
            // can later detect staleness by re-hashing at execution
            // time. A deleted path has nothing left to hash.
            if !kind.ends_with("deleted") {
                match crate::hashing::hash_path(path) {
                    Ok(hash) => event = event.with_hash(hash),
                    Err(e) => log::warn!("could not hash {} at event time: {}", path.display(), e),
                }
            }

            if self.sender.send(event).is_err() {
                log::warn!("event source receiver dropped; discarding event for {}", path.display());
            }
        }
    }
}

impl WatchexecHandler for RawEventHandler {
    fn on_update(&self, ops: &[PathOp]) -> watchexec::error::Result<bool> {
        if ops.len() == 1 {
            if let Some(op_type) = ops[0].op {
                self.send(&ops[0].path, op_type);
            }
            return Ok(true);
        }

        let mut map = HashMap::<PathBuf, (usize, &PathOp)>::new();
        for op in ops {
            let op_type = match op.op {
                Some(t) => t,
                None => continue,
            };
            let len = map.len();
            match map.entry(op.path.clone()) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().1 = op;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert((len, op));
                }
            }
            let _ = op_type;
        }

        if ops.len() != map.len() {
            info!(
                "received {} file operations, simplified to {} event{}",
                ops.len(),
                map.len(),
                plural_s(map.len())
            );
        }

        let mut events: Vec<_> = map.into_iter().map(|(path, (ord, op))| (ord, path, op.op)).collect();
        events.sort_by_key(|tpl| tpl.0);

        for (_, path, op_type) in events {
            if let Some(op_type) = op_type {
                self.send(&path, op_type);
            }
        }

        Ok(true)
    }

    fn on_manual(&self) -> watchexec::error::Result<bool> {
        Ok(true)
    }

    fn args(&self) -> Args {
        self.args.clone()
    }
}

/// An in-memory source whose events are pushed by test code rather than
/// a real filesystem watch.
#[derive(Default)]
pub struct ScriptedEventSource {
    pending: Vec<RawEvent>,
}

impl ScriptedEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: RawEvent) {
        self.pending.push(event);
    }
}

impl EventSource for ScriptedEventSource {
    fn start(&mut self, sender: Sender<RawEvent>) -> crate::error::Result<()> {
        for event in self.pending.drain(..) {
            let _ = sender.send(event);
        }
        Ok(())
    }
}
