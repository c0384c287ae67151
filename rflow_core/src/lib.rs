//! Core library for an event-driven workflow scheduler: declarative
//! patterns/recipes/rules bound to file-system events, a monitor that
//! matches events against rules, handlers that materialise jobs, and
//! conductors that execute them through to a terminal, persisted state.

pub mod conductor;
pub mod error;
pub mod event;
pub mod handler;
pub mod hashing;
pub mod io;
pub mod job;
pub mod monitor;
pub mod pattern;
pub mod recipe;
pub mod rule;
pub mod runner;
mod thread_clutch;
pub mod utils;
pub mod vars;

pub use conductor::{Conductor, ConductorCriteria, ExternalInterpreter, Interpreter, JobKindConductorCriteria};
pub use error::{Error, Result};
pub use event::{MatchedEvent, RawEvent};
pub use handler::{Handler, HandlerCriteria, JobKindCriteria};
pub use job::{Job, JobStatus};
pub use monitor::{EventSource, Monitor, ScriptedEventSource, WatchexecEventSource};
pub use pattern::FileEventPattern;
pub use recipe::{JobKind, Recipe, RecipeBody};
pub use rule::Rule;
pub use runner::Runner;
pub use thread_clutch::ThreadClutch;
