use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use clap::{App, Arg};
use env_logger::Builder;
use log::info;

use rflow_core::{
    ConductorCriteria, Conductor, ExternalInterpreter, Handler, HandlerCriteria, JobKind,
    JobKindConductorCriteria, JobKindCriteria, Monitor, Runner, WatchexecEventSource,
};

mod manifest;

use manifest::Manifest;

pub const CARGO_PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
pub const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

struct CommandLineArguments {
    base_dir: PathBuf,
    manifest: PathBuf,
    job_queue_dir: PathBuf,
    job_output_dir: PathBuf,
    settle_time_secs: f64,
}

fn get_cli_arguments() -> CommandLineArguments {
    let matches = App::new(CARGO_PKG_NAME)
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .arg(
            Arg::with_name("MANIFEST")
                .about("Path to the YAML manifest declaring patterns and recipes")
                .short('m')
                .long("manifest")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("QUEUE-DIR")
                .about("Directory jobs are created in before execution")
                .long("queue-dir")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("OUTPUT-DIR")
                .about("Directory completed jobs are moved to")
                .long("output-dir")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("SETTLE-TIME")
                .about("Seconds within which repeated events on the same path are coalesced")
                .short('s')
                .long("settle-time")
                .takes_value(true),
        )
        .arg("[base] 'The directory to watch (defaults to cwd)'")
        .get_matches();

    let base_dir = matches.value_of("base").map_or_else(
        || std::env::current_dir().expect("cannot determine cwd"),
        PathBuf::from,
    );

    let manifest = PathBuf::from(matches.value_of("MANIFEST").expect("manifest is required"));

    let job_queue_dir = matches
        .value_of("QUEUE-DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| base_dir.join(rflow_core::vars::DEFAULT_JOB_QUEUE_DIR));

    let job_output_dir = matches
        .value_of("OUTPUT-DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| base_dir.join(rflow_core::vars::DEFAULT_JOB_OUTPUT_DIR));

    let settle_time_secs = matches
        .value_of("SETTLE-TIME")
        .map(|v| f64::from_str(v).expect("invalid SETTLE-TIME"))
        .unwrap_or(1.0);

    CommandLineArguments {
        base_dir,
        manifest,
        job_queue_dir,
        job_output_dir,
        settle_time_secs,
    }
}

fn main() {
    configure_logging();
    info!("starting {}", CARGO_PKG_NAME);

    let args = get_cli_arguments();
    info!("{:?}", args.manifest);

    let manifest = Manifest::load(&args.manifest).expect("failed to load manifest");
    std::fs::create_dir_all(&args.job_queue_dir).expect("cannot create job queue dir");
    std::fs::create_dir_all(&args.job_output_dir).expect("cannot create job output dir");

    let source = WatchexecEventSource::new(args.base_dir.clone(), 500);
    let monitor = Monitor::new(
        args.base_dir.clone(),
        manifest.patterns,
        manifest.recipes,
        args.settle_time_secs,
        Box::new(source),
    )
    .expect("failed to construct monitor");

    let handlers: Vec<Handler> = all_job_kinds()
        .into_iter()
        .map(|kind| {
            Handler::new(
                args.job_queue_dir.clone(),
                200,
                Box::new(JobKindCriteria(kind)) as Box<dyn HandlerCriteria>,
            )
        })
        .collect();

    let conductors: Vec<Conductor> = all_job_kinds()
        .into_iter()
        .map(|kind| {
            Conductor::new(
                args.job_queue_dir.clone(),
                args.job_output_dir.clone(),
                200,
                Box::new(JobKindConductorCriteria(kind)) as Box<dyn ConductorCriteria>,
                Box::new(ExternalInterpreter::default()),
            )
        })
        .collect();

    let runner = Arc::new(Runner::new(vec![monitor], handlers, conductors));
    let _runner = runner.start();

    info!("{} running; press Ctrl-C to stop", CARGO_PKG_NAME);
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}

fn all_job_kinds() -> Vec<JobKind> {
    vec![JobKind::Script, JobKind::Shell, JobKind::Notebook]
}

/// Mirrors the teacher's `configure_logging`: an `env_logger` builder
/// with a UTC-timestamped format, set up before anything else runs.
fn configure_logging() {
    let mut builder = Builder::from_default_env();
    builder.format(|buf, record| {
        let utc = Utc::now();
        match (record.file(), record.line()) {
            (Some(file), Some(line)) => writeln!(
                buf,
                "{:?} {} [{}/{}] {}",
                utc,
                record.level(),
                file,
                line,
                record.args()
            ),
            (Some(file), None) => writeln!(
                buf,
                "{:?} {} [{}] {}",
                utc,
                record.level(),
                file,
                record.args()
            ),
            (None, Some(_line)) => writeln!(buf, "{:?} {} {}", utc, record.level(), record.args()),
            (None, None) => writeln!(buf, "{:?} {} {}", utc, record.level(), record.args()),
        }
    });
    builder.init();
}
