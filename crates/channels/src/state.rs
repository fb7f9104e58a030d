use serde::{Deserialize, Serialize};

/// Lifecycle of one connector.
///
/// ```text
/// Created ──► Connecting ──► Running ──► Stopping ──► Stopped
///    │            │             │
///    └────────────┴─────────────┴──────► Failed
/// ```
///
/// `Stopping` is also reachable from `Created` and `Connecting` when a stop
/// arrives before the connection is up. `Failed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    Created,
    Connecting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal connector transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectorState,
    pub to: ConnectorState,
}

impl ConnectorState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectorState::*;
        matches!(
            (self, next),
            (Created, Connecting | Stopping | Failed)
                | (Connecting, Running | Stopping | Failed)
                | (Running, Stopping | Failed)
                | (Stopping, Stopped)
        )
    }

    /// Validate a transition, returning the new state.
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
