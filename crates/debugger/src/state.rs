use std::fmt;

use serde_json::Value;
use transport::types::{BreakpointEntry, CallstackFrame, Variable};

/// Where the controller's connection to the interpreter stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    DebuggerRunning,
    DebuggerPaused,
    /// The script completed, nothing changes after this
    DebuggerFinished,
}

impl ConnectionState {
    /// Whether requests can be sent
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::DebuggerRunning
                | ConnectionState::DebuggerPaused
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::DebuggerRunning => "running",
            ConnectionState::DebuggerPaused => "paused",
            ConnectionState::DebuggerFinished => "finished",
        };
        f.write_str(name)
    }
}

/// Everything the controller tells its UI
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Fired before the more specific events of the same transition
    StateChanged {
        state: ConnectionState,
        previous: ConnectionState,
    },
    ConnectionEstablished,
    ConnectionFailed,
    ConnectionLost,
    DebuggerRunning,
    DebuggerPaused,
    DebuggerFinished,
    SourceCode {
        path: String,
        text: String,
        ast: Value,
    },
    Breakpoints(Vec<BreakpointEntry>),
    /// Innermost frame first
    Callstack(Vec<CallstackFrame>),
    Variables {
        depth: i64,
        variables: Vec<Variable>,
    },
}
