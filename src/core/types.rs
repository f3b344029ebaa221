/// Supervisor lifecycle types
use serde::Serialize;
use std::process::ExitCode;

/// Lifecycle phase, reported in logs as the supervisor advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    Configuring,
    ResourceLimited,
    TransportReady,
    EngineRunning,
    Stopped,
    Failed,
}

/// Request to end the engine run, delivered only to the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// Top-level interrupt (SIGINT/SIGTERM)
    Interrupt { signal: i32 },
}

/// Why a run ended cleanly
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The engine's run call returned
    EngineReturned,
    /// The peer went away mid-write (broken pipe)
    PeerClosed,
    /// A top-level interrupt arrived while the engine was running
    Interrupted { signal: i32 },
}

/// Terminal state of one supervised run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Stopped(StopReason),
    Failed,
}

impl Outcome {
    pub const FAILURE_EXIT_CODE: u8 = 1;

    pub fn phase(&self) -> Phase {
        match self {
            Self::Stopped(_) => Phase::Stopped,
            Self::Failed => Phase::Failed,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Stopped(_) => 0,
            Self::Failed => Self::FAILURE_EXIT_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}
