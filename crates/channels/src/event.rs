use {async_trait::async_trait, ferry_common::ConnectionKey, serde::Serialize};

use crate::state::ConnectorState;

/// Lifecycle events emitted by connection workers.
///
/// This is the only health signal the core exposes; the outer layer decides
/// what to do about a terminated connection (e.g. call `ensure_running` again).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectorEvent {
    StateChanged {
        key: ConnectionKey,
        from: ConnectorState,
        to: ConnectorState,
    },
    /// A connection worker finished. `state` is `Stopped` or `Failed`.
    Terminated {
        key: ConnectionKey,
        state: ConnectorState,
        reason: Option<String>,
    },
}

/// Sink for connector lifecycle events; the host application provides it.
#[async_trait]
pub trait ConnectorEventSink: Send + Sync {
    async fn emit(&self, event: ConnectorEvent);
}
