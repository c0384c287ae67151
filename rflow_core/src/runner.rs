//! The Runner supervises one-or-more monitors, handlers, and conductors.
//! Grounded on the original `MeowRunner`: one channel per monitor
//! fanning in to a single loop, random tie-break among eligible
//! handlers/conductors, double-start/stop-before-start reported as
//! warnings rather than fatal errors. Event matching and handler
//! dispatch happen inline on the main loop thread (both are fast,
//! in-process work); each conductor execution is handed off to its own
//! short-lived worker thread via the `JobReady` message so a
//! long-running job can never block intake of the next event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use rand::Rng;

use crate::conductor::Conductor;
use crate::error::Result;
use crate::event::MatchedEvent;
use crate::handler::{routing_error, Handler};
use crate::monitor::Monitor;

/// What a monitor's forwarder thread relays onto the shared channel:
/// the matched event plus which monitor it came from (for diagnostics).
struct Inbound {
    event: MatchedEvent,
}

enum RunnerMessage {
    Event(Inbound),
    JobReady(std::path::PathBuf),
    Stop,
}

pub struct Runner {
    monitors: Mutex<Vec<Monitor>>,
    handlers: Vec<Handler>,
    conductors: Vec<Conductor>,
    started: AtomicBool,
    stop_tx: Mutex<Option<Sender<RunnerMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// One short-lived thread per dispatched job execution, so a
    /// long-running conductor never blocks event intake on the main
    /// loop. Joined (not aborted) on `stop`.
    conductor_workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Runner {
    pub fn new(monitors: Vec<Monitor>, handlers: Vec<Handler>, conductors: Vec<Conductor>) -> Self {
        Runner {
            monitors: Mutex::new(monitors),
            handlers,
            conductors,
            started: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            worker: Mutex::new(None),
            conductor_workers: Mutex::new(Vec::new()),
        }
    }

    /// Start every monitor, then the main supervisor loop. Repeated
    /// calls are a non-fatal warning, matching the original's
    /// `RuntimeWarning` on double-start.
    pub fn start(self: Arc<Self>) -> Arc<Self> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("repeated calls to start have no effect");
            return self;
        }

        let (tx, rx): (Sender<RunnerMessage>, Receiver<RunnerMessage>) = channel();

        for monitor in self.monitors.lock().unwrap().iter_mut() {
            let (monitor_tx, monitor_rx) = channel::<MatchedEvent>();
            if let Err(e) = monitor.start(monitor_tx) {
                warn!("monitor failed to start: {}", e);
                continue;
            }
            let forward = tx.clone();
            thread::Builder::new()
                .name("MonitorForwarder".into())
                .spawn(move || {
                    for event in monitor_rx {
                        if forward.send(RunnerMessage::Event(Inbound { event })).is_err() {
                            break;
                        }
                    }
                })
                .expect("cannot spawn monitor forwarder thread");
        }

        *self.stop_tx.lock().unwrap() = Some(tx);

        let loop_handle = {
            let this = Arc::clone(&self);
            thread::Builder::new()
                .name("Runner".into())
                .spawn(move || this.run_loop(rx))
                .expect("cannot spawn runner main loop thread")
        };
        *self.worker.lock().unwrap() = Some(loop_handle);

        info!("runner starting");
        self
    }

    /// Runs on the Runner's own thread, holding the `Arc` a dispatched
    /// conductor worker clones from. Event matching and handler
    /// dispatch (file writes) stay inline here; conductor execution is
    /// handed off to its own worker so one long-running job can never
    /// stall intake of the next event.
    fn run_loop(self: Arc<Self>, rx: Receiver<RunnerMessage>) {
        for message in rx {
            match message {
                RunnerMessage::Stop => return,
                RunnerMessage::Event(inbound) => self.dispatch_to_handler(inbound.event),
                RunnerMessage::JobReady(job_dir) => {
                    let this = Arc::clone(&self);
                    let handle = thread::Builder::new()
                        .name("ConductorWorker".into())
                        .spawn(move || this.dispatch_to_conductor(job_dir))
                        .expect("cannot spawn conductor worker thread");
                    self.conductor_workers.lock().unwrap().push(handle);
                }
            }
        }
    }

    fn dispatch_to_handler(&self, event: MatchedEvent) {
        let candidates: Vec<&Handler> = self
            .handlers
            .iter()
            .filter(|h| h.accepts(&event, &event.rule))
            .collect();

        let chosen = match candidates.len() {
            0 => {
                warn!("{}", routing_error(&event));
                return;
            }
            1 => candidates[0],
            n => candidates[rand::thread_rng().gen_range(0..n)],
        };

        match chosen.handle(&event, &event.rule) {
            Ok(job_dirs) => {
                let tx = self.stop_tx.lock().unwrap().clone();
                let tx = match tx {
                    Some(tx) => tx,
                    None => {
                        warn!("runner has no active channel; dropping {} job(s)", job_dirs.len());
                        return;
                    }
                };
                for job_dir in job_dirs {
                    if tx.send(RunnerMessage::JobReady(job_dir)).is_err() {
                        warn!("runner channel closed; could not schedule job for execution");
                    }
                }
            }
            Err(e) => warn!("handler failed for {}: {}", event.path.display(), e),
        }
    }

    fn dispatch_to_conductor(&self, job_dir: std::path::PathBuf) {
        let job = match crate::io::threadsafe_read_job(&job_dir) {
            Ok(job) => job,
            Err(e) => {
                warn!("could not read job at {}: {}", job_dir.display(), e);
                return;
            }
        };

        let candidates: Vec<&Conductor> = self
            .conductors
            .iter()
            .filter(|c| c.accepts(&job))
            .collect();

        let chosen = match candidates.len() {
            0 => {
                warn!("no conductor accepted job '{}'", job.id);
                return;
            }
            1 => candidates[0],
            n => candidates[rand::thread_rng().gen_range(0..n)],
        };

        if let Err(e) = chosen.execute(&job_dir) {
            warn!("conductor execution failed for job '{}': {}", job.id, e);
        }
    }

    /// Stop every monitor and join the main loop. Stopping before
    /// starting is a non-fatal warning.
    pub fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) {
            warn!("cannot stop a runner that was not started");
            return;
        }

        for monitor in self.monitors.lock().unwrap().iter_mut() {
            monitor.stop();
        }

        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(RunnerMessage::Stop);
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        for handle in self.conductor_workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        info!("runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::{Interpreter, JobKindConductorCriteria};
    use crate::event::RawEvent;
    use crate::handler::JobKindCriteria;
    use crate::monitor::ScriptedEventSource;
    use crate::pattern::FileEventPattern;
    use crate::recipe::{JobKind, Recipe, RecipeBody};
    use std::collections::HashMap;
    use std::path::Path;

    struct EchoInterpreter;
    impl Interpreter for EchoInterpreter {
        fn run(&self, _job_dir: &Path, _job: &crate::job::Job) -> std::result::Result<String, String> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn end_to_end_single_file_event_produces_one_completed_job() {
        let base = tempfile::tempdir().unwrap();
        let queue = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        std::fs::create_dir_all(base.path().join("start")).unwrap();
        let trigger = base.path().join("start").join("A.txt");
        std::fs::write(&trigger, b"25000").unwrap();

        let mut pattern = FileEventPattern::new("p1", "start/*.txt", "r1", "infile");
        pattern.event_mask = vec!["file_created".to_string()];
        pattern
            .outputs
            .insert("outfile".to_string(), "output/{FILENAME}".to_string());

        let mut patterns = HashMap::new();
        patterns.insert("p1".to_string(), pattern);
        let mut recipes = HashMap::new();
        recipes.insert(
            "r1".to_string(),
            Recipe::new(
                "r1",
                RecipeBody::Shell {
                    source: "cat {infile}".to_string(),
                },
            ),
        );

        let mut source = ScriptedEventSource::new();
        source.push(RawEvent::new("created", trigger.clone(), false));

        let monitor = Monitor::new(base.path(), patterns, recipes, 1.0, Box::new(source)).unwrap();
        let handler = Handler::new(queue.path(), 50, Box::new(JobKindCriteria(JobKind::Shell)));
        let conductor = Conductor::new(
            queue.path(),
            output.path(),
            50,
            Box::new(JobKindConductorCriteria(JobKind::Shell)),
            Box::new(EchoInterpreter),
        );

        let runner = Arc::new(Runner::new(vec![monitor], vec![handler], vec![conductor]));
        let runner = runner.start();

        std::thread::sleep(std::time::Duration::from_millis(500));

        let entries: Vec<_> = std::fs::read_dir(output.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        runner.stop();
    }
}
