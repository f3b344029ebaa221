/// Startup configuration resolution
use super::types::{DiagnosticsSink, Endpoint, ResourceLimits, Result, TransportSpec, WorkerError};
use crate::observability::{DiagnosticsConfig, LogLevelOverride};
use serde::Serialize;
use std::path::PathBuf;

/// Directory under the user's home used when no storage root is given.
pub const DEFAULT_STORAGE_DIR: &str = ".codeintel";

/// Sink used when the diagnostics argument is omitted entirely.
pub const DEFAULT_DIAGNOSTICS_SINK: &str = "stderr";

/// `--pipe` values that name the inherited standard streams.
const STDIO_PIPE_NAMES: [&str; 3] = ["-", "stdin", "/dev/stdin"];

/// Raw startup arguments, positional ones first, as received from the host.
#[derive(Clone, Debug, Default)]
pub struct StartupArgs {
    pub storage_root: Option<PathBuf>,
    pub remote_endpoint: Option<String>,
    pub log_levels: Option<String>,
    pub diagnostics_sink: Option<String>,
    pub listen: Option<String>,
    pub pipe: Option<PathBuf>,
    pub verbosity: u8,
    pub no_resource_limits: bool,
    pub address_space_limit_mib: Option<u64>,
}

/// Fully resolved, immutable startup configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StartupConfig {
    pub storage_root: PathBuf,
    pub transport: TransportSpec,
    pub log_level_overrides: Vec<LogLevelOverride>,
    pub diagnostics_sink: DiagnosticsSink,
    pub verbosity: u8,
    pub limits: ResourceLimits,
}

impl StartupConfig {
    /// `~/.codeintel`, or `./.codeintel` when no home directory is known.
    pub fn default_storage_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORAGE_DIR)
    }

    pub fn diagnostics(&self) -> DiagnosticsConfig {
        DiagnosticsConfig::new(
            self.diagnostics_sink.clone(),
            self.log_level_overrides.clone(),
        )
        .with_verbosity(self.verbosity)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable: {}>", e))
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            storage_root: Self::default_storage_root(),
            transport: TransportSpec::Stdio,
            log_level_overrides: Vec::new(),
            diagnostics_sink: DiagnosticsSink::StdErr,
            verbosity: 0,
            limits: ResourceLimits::default(),
        }
    }
}

/// Treat empty positional arguments the same as omitted ones.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StartupArgs {
    /// Apply defaults and parse endpoints and overrides.
    pub fn resolve(self) -> Result<StartupConfig> {
        let storage_root = self
            .storage_root
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(StartupConfig::default_storage_root);

        let remote_endpoint = non_empty(self.remote_endpoint);
        let pipe = self
            .pipe
            .filter(|dir| !STDIO_PIPE_NAMES.iter().any(|name| dir.as_os_str() == *name));
        let transport = match (remote_endpoint, non_empty(self.listen), pipe) {
            (None, None, None) => TransportSpec::Stdio,
            (Some(remote), None, None) => TransportSpec::Connect(Endpoint::parse_connect(&remote)?),
            (None, Some(listen), None) => TransportSpec::Listen(Endpoint::parse_listen(&listen)?),
            (None, None, Some(dir)) => TransportSpec::Pipe(dir),
            _ => {
                return Err(WorkerError::Config(
                    "Only one of remote endpoint, --listen and --pipe may be given".to_string(),
                ))
            }
        };

        let log_level_overrides = self
            .log_levels
            .as_deref()
            .map(LogLevelOverride::parse_list)
            .unwrap_or_default();

        let diagnostics_sink = DiagnosticsSink::from_spec(Some(
            self.diagnostics_sink
                .as_deref()
                .unwrap_or(DEFAULT_DIAGNOSTICS_SINK),
        ));

        let limits = ResourceLimits {
            enabled: !self.no_resource_limits,
            address_space_cap: self
                .address_space_limit_mib
                .map(|mib| mib.saturating_mul(1 << 20)),
            ..ResourceLimits::default()
        };

        Ok(StartupConfig {
            storage_root,
            transport,
            log_level_overrides,
            diagnostics_sink,
            verbosity: self.verbosity,
            limits,
        })
    }
}
