// Connection status exposed to the dashboard, driven by poll outcomes
use serde::Serialize;
use std::fmt;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// connecting -> connected <-> reconnecting -> disconnected -> connected.
/// There is no terminal state.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    status: ConnectionStatus,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl ConnectionTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            consecutive_failures: 0,
            failure_threshold,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns true when the status changed
    pub fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        self.transition(ConnectionStatus::Connected)
    }

    /// Returns true when the status changed
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let next = if self.consecutive_failures >= self.failure_threshold {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Reconnecting
        };
        self.transition(next)
    }

    fn transition(&mut self, next: ConnectionStatus) -> bool {
        let changed = self.status != next;
        self.status = next;
        changed
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
