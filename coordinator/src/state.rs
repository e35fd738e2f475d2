//! Refresh service state definitions.

use std::fmt;

/// Refresh service operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Constructed, workers not yet spawned.
    Starting,
    /// Workers running, admissions accepted.
    Running,
    /// Shutdown in progress, admissions rejected.
    ShuttingDown,
    /// Workers joined and store closed.
    Stopped,
}

impl ServiceState {
    /// Check if the service is accepting new admissions.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// Check if shutdown has begun or finished.
    pub fn is_stopping(&self) -> bool {
        matches!(self, ServiceState::ShuttingDown | ServiceState::Stopped)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::ShuttingDown => "shutting_down",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
