//! Log level overrides of the form `name:level`.

use log::LevelFilter;
use serde::Serialize;
use std::fmt;

/// Verbosity requested for a logger.
///
/// Symbolic levels cover the usual four names; anything numeric is kept as
/// a raw severity and mapped onto the conventional 10/20/30/40/50 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Numeric(i64),
}

impl Level {
    /// Parse a level token. Integers win; unknown names fall back to `Error`.
    pub fn parse_lenient(token: &str) -> Self {
        let token = token.trim();
        if let Ok(severity) = token.parse::<i64>() {
            return Self::Numeric(severity);
        }

        match token.to_ascii_uppercase().as_str() {
            "TRACE" => Self::Trace,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" | "CRITICAL" => Self::Error,
            _ => Self::Error,
        }
    }

    pub fn to_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::Trace,
            Self::Debug => LevelFilter::Debug,
            Self::Info => LevelFilter::Info,
            Self::Warn => LevelFilter::Warn,
            Self::Error => LevelFilter::Error,
            Self::Numeric(n) if n < 10 => LevelFilter::Trace,
            Self::Numeric(n) if n < 20 => LevelFilter::Debug,
            Self::Numeric(n) if n < 30 => LevelFilter::Info,
            Self::Numeric(n) if n < 40 => LevelFilter::Warn,
            Self::Numeric(n) if n <= 50 => LevelFilter::Error,
            Self::Numeric(_) => LevelFilter::Off,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => f.write_str("TRACE"),
            Self::Debug => f.write_str("DEBUG"),
            Self::Info => f.write_str("INFO"),
            Self::Warn => f.write_str("WARN"),
            Self::Error => f.write_str("ERROR"),
            Self::Numeric(n) => write!(f, "{}", n),
        }
    }
}

/// One `(logger, level)` pair. An empty logger name addresses the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogLevelOverride {
    pub logger: String,
    pub level: Level,
}

impl LogLevelOverride {
    /// Split on the first `:`. A token without a separator targets the root.
    ///
    /// Dotted names are rewritten to `::` paths so they line up with Rust
    /// log targets.
    pub fn parse(token: &str) -> Self {
        let (name, level) = match token.split_once(':') {
            Some((name, level)) => (name, level),
            None => ("", token),
        };

        Self {
            logger: name.trim().replace('.', "::"),
            level: Level::parse_lenient(level),
        }
    }

    /// Parse a comma-separated override list, skipping empty entries.
    pub fn parse_list(spec: &str) -> Vec<Self> {
        spec.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.logger.is_empty()
    }

    /// True for the logger itself and its `::` children, never for siblings
    /// that merely share a name prefix.
    pub fn covers(&self, target: &str) -> bool {
        !self.is_root()
            && target
                .strip_prefix(self.logger.as_str())
                .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
    }
}

/// Resolve the effective level for `logger`; later overrides win.
pub fn effective_level(overrides: &[LogLevelOverride], logger: &str) -> Option<Level> {
    overrides
        .iter()
        .rev()
        .find(|o| o.logger == logger)
        .map(|o| o.level)
}

/// Level for a log `target` from the most specific covering override.
/// Among overrides for the same name the later one wins.
pub fn override_for(overrides: &[LogLevelOverride], target: &str) -> Option<Level> {
    overrides
        .iter()
        .enumerate()
        .filter(|(_, o)| o.covers(target))
        .max_by_key(|(index, o)| (o.logger.len(), *index))
        .map(|(_, o)| o.level)
}
