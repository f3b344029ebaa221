use crate::config::startup::DEFAULT_DIAGNOSTICS_SINK;
use crate::config::StartupArgs;
use crate::core::engine::DrainEngine;
use crate::core::supervisor;
use crate::core::types::Outcome;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Out-of-process language-intelligence worker", long_about = None)]
struct Cli {
    /// Storage root for the engine's databases [default: ~/.codeintel]
    #[arg(value_name = "STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// HOST:PORT of the host to connect to; stdin/stdout are used when omitted
    #[arg(value_name = "REMOTE")]
    remote_endpoint: Option<String>,

    /// Comma-separated `logger:LEVEL` overrides (a bare LEVEL sets the root)
    #[arg(value_name = "LOG_LEVELS")]
    log_levels: Option<String>,

    /// Diagnostics sink: `stdout`, `stderr`, a file path, or empty to discard
    #[arg(value_name = "LOG_FILE", default_value = DEFAULT_DIAGNOSTICS_SINK)]
    diagnostics_sink: String,

    /// Listen on [HOST:]PORT and serve the first host that connects
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Use DIR/out and DIR/in FIFOs (a named pipe on Windows); `-` means stdio
    #[arg(long, value_name = "DIR|NAME")]
    pipe: Option<PathBuf>,

    /// Raise verbosity (-v: this worker at DEBUG, -vv: everything at TRACE)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Skip lowering priority and reserving address space
    #[arg(long)]
    no_resource_limits: bool,

    /// Cap the address space at this many MiB where the platform supports it
    #[arg(long, value_name = "MIB")]
    address_space_limit: Option<u64>,
}

impl Cli {
    fn into_args(self) -> StartupArgs {
        StartupArgs {
            storage_root: self.storage_root,
            remote_endpoint: self.remote_endpoint,
            log_levels: self.log_levels,
            diagnostics_sink: Some(self.diagnostics_sink),
            listen: self.listen,
            pipe: self.pipe,
            verbosity: self.verbose,
            no_resource_limits: self.no_resource_limits,
            address_space_limit_mib: self.address_space_limit,
        }
    }
}

/// Parse the command line, run the worker and map the outcome to an exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_args().resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("oop-worker: {}", e);
            return ExitCode::from(Outcome::FAILURE_EXIT_CODE);
        }
    };

    supervisor::run(config, &DrainEngine::construct).into()
}
