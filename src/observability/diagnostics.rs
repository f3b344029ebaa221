/// Diagnostics sink and per-target verbosity
///
/// `DiagnosticsConfig` is a plain value describing where log output goes and
/// how verbose each target is. [`DiagnosticsConfig::install`] is the only code
/// in the crate that mutates process-wide logging or standard stream state,
/// and it does so at most once per process.
use super::level::{effective_level, override_for, LogLevelOverride};
use crate::config::types::{DiagnosticsSink, Result, WorkerError};
use crate::kernel::stdio::rebind_std_streams;
use env_logger::{Builder, Env, Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Environment variable carrying extra `env_logger` directives.
pub const LOG_ENV_VAR: &str = "OOP_WORKER_LOG";

/// Log target of this crate, raised by `-v`.
const WORKER_TARGET: &str = "oop_worker";

static INSTALLED: Mutex<Option<DiagnosticsSink>> = Mutex::new(None);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    sink: DiagnosticsSink,
    overrides: Vec<LogLevelOverride>,
    verbosity: u8,
}

impl DiagnosticsConfig {
    pub const DEFAULT_ROOT_LEVEL: LevelFilter = LevelFilter::Info;

    /// Resolve a sink argument and raw `name:level` tokens.
    pub fn configure<S: AsRef<str>>(sink_spec: Option<&str>, overrides: &[S]) -> Self {
        let overrides = overrides
            .iter()
            .map(|token| token.as_ref().trim())
            .filter(|token| !token.is_empty())
            .map(LogLevelOverride::parse)
            .collect();
        Self::new(DiagnosticsSink::from_spec(sink_spec), overrides)
    }

    pub fn new(sink: DiagnosticsSink, overrides: Vec<LogLevelOverride>) -> Self {
        Self {
            sink,
            overrides,
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Effective root level after verbosity and bare overrides.
    pub fn root_level(&self) -> LevelFilter {
        match effective_level(&self.overrides, "") {
            Some(level) => level.to_filter(),
            None if self.verbosity >= 2 => LevelFilter::Trace,
            None => Self::DEFAULT_ROOT_LEVEL,
        }
    }

    /// Build (but do not install) a logger writing to `target`.
    ///
    /// Targets without a named override are filtered by the root level,
    /// verbosity and `OOP_WORKER_LOG`, in that order. A named override then
    /// decides for its logger and the `::` children of it.
    pub fn build_logger(&self, target: Target) -> DiagnosticsLogger {
        let mut policy = Builder::new();
        policy.filter_level(Self::DEFAULT_ROOT_LEVEL);

        match self.verbosity {
            0 => {}
            1 => {
                policy.filter_module(WORKER_TARGET, LevelFilter::Debug);
            }
            _ => {
                policy.filter_level(LevelFilter::Trace);
            }
        }

        policy.parse_env(Env::new().filter(LOG_ENV_VAR));

        for o in self.overrides.iter().filter(|o| o.is_root()) {
            policy.filter_level(o.level.to_filter());
        }

        let write_style = match target {
            Target::Stdout | Target::Stderr => WriteStyle::Auto,
            _ => WriteStyle::Never,
        };

        let writer = Builder::new()
            .filter_level(LevelFilter::Trace)
            .target(target)
            .write_style(write_style)
            .format(format_record)
            .build();

        DiagnosticsLogger {
            policy: policy.target(Target::Pipe(Box::new(io::sink()))).build(),
            overrides: self
                .overrides
                .iter()
                .filter(|o| !o.is_root())
                .cloned()
                .collect(),
            writer,
        }
    }

    /// Open the sink and install the global logger.
    ///
    /// For a file sink the process stdout and stderr descriptors are rebound
    /// to the same file first. A second call keeps the first configuration.
    pub fn install(&self) -> Result<()> {
        let mut installed = INSTALLED.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = installed.as_ref() {
            log::warn!(
                "Diagnostics already configured with {:?}; ignoring {:?}",
                active,
                self.sink
            );
            return Ok(());
        }

        let target = match &self.sink {
            DiagnosticsSink::Discard => Target::Pipe(Box::new(io::sink())),
            DiagnosticsSink::StdOut => Target::Stdout,
            DiagnosticsSink::StdErr => Target::Stderr,
            DiagnosticsSink::File(path) => {
                let file = open_sink_file(path)?;
                rebind_std_streams(&file).map_err(WorkerError::StreamRebind)?;
                Target::Pipe(Box::new(file))
            }
        };

        let logger = self.build_logger(target);
        let max_level = logger.max_level();
        if log::set_boxed_logger(Box::new(logger)).is_ok() {
            log::set_max_level(max_level);
        } else {
            log::warn!("A logger was installed elsewhere; diagnostics settings not applied");
        }

        *installed = Some(self.sink.clone());
        log::debug!(
            "Diagnostics configured: sink={:?}, root={}, overrides={}",
            self.sink,
            self.root_level(),
            self.overrides.len()
        );
        Ok(())
    }
}

/// Global logger: `env_logger` policy and formatting, with named overrides
/// matched on whole `::` path segments.
pub struct DiagnosticsLogger {
    policy: env_logger::Logger,
    overrides: Vec<LogLevelOverride>,
    writer: env_logger::Logger,
}

impl DiagnosticsLogger {
    /// Most verbose level any target can reach.
    pub fn max_level(&self) -> LevelFilter {
        self.overrides
            .iter()
            .map(|o| o.level.to_filter())
            .fold(self.policy.filter(), std::cmp::max)
    }
}

impl Log for DiagnosticsLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match override_for(&self.overrides, metadata.target()) {
            Some(level) => metadata.level() <= level.to_filter(),
            None => self.policy.enabled(metadata),
        }
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.writer.log(record);
        }
    }

    fn flush(&self) {
        self.writer.flush();
    }
}

/// Open a file sink for unbuffered, truncating writes.
fn open_sink_file(path: &Path) -> Result<File> {
    let sink_error = |source| WorkerError::DiagnosticsSink {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(sink_error)?;
        }
    }

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(sink_error)
}

fn format_record(buf: &mut env_logger::fmt::Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "[{} {:>5} {}] {}",
        buf.timestamp_millis(),
        record.level(),
        record.target(),
        record.args()
    )
}
