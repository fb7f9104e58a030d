//! Metric name and label definitions.
//!
//! Centralizing names keeps the connector, routing and supervisor crates
//! consistent with each other and with dashboards.

/// Connection supervisor metrics
pub mod supervisor {
    /// Number of connection workers currently registered
    pub const ACTIVE_WORKERS: &str = "ferry_supervisor_active_workers";
    /// Total connection workers spawned
    pub const WORKERS_SPAWNED_TOTAL: &str = "ferry_supervisor_workers_spawned_total";
    /// Connection workers that ended, labelled by final state
    pub const WORKERS_TERMINATED_TOTAL: &str = "ferry_supervisor_workers_terminated_total";
}

/// Connector metrics (both variants, labelled by kind)
pub mod connector {
    /// Inbound events accepted for routing
    pub const EVENTS_RECEIVED_TOTAL: &str = "ferry_connector_events_received_total";
    /// Inbound events dropped before routing (e.g. private chats)
    pub const EVENTS_IGNORED_TOTAL: &str = "ferry_connector_events_ignored_total";
    /// Connector failures, labelled by error kind
    pub const FAILURES_TOTAL: &str = "ferry_connector_failures_total";
    /// Polling round-trip duration for gateway-bot connectors
    pub const POLLING_DURATION_SECONDS: &str = "ferry_connector_polling_duration_seconds";
}

/// Routing engine metrics
pub mod routing {
    /// Rules matched by inbound events
    pub const RULES_MATCHED_TOTAL: &str = "ferry_routing_rules_matched_total";
    /// Forwards delivered
    pub const FORWARDS_DELIVERED_TOTAL: &str = "ferry_routing_forwards_delivered_total";
    /// Forwards that failed and were skipped
    pub const FORWARDS_FAILED_TOTAL: &str = "ferry_routing_forwards_failed_total";
    /// Configuration lookup failures
    pub const LOOKUP_ERRORS_TOTAL: &str = "ferry_routing_lookup_errors_total";
    /// Time spent routing one event
    pub const ROUTE_DURATION_SECONDS: &str = "ferry_routing_route_duration_seconds";
}

/// Vault metrics
pub mod vault {
    /// Secrets that failed to decrypt
    pub const DECRYPT_FAILURES_TOTAL: &str = "ferry_vault_decrypt_failures_total";
}

/// Common label keys
pub mod labels {
    pub const KIND: &str = "kind";
    pub const MODE: &str = "mode";
    pub const STATE: &str = "state";
    pub const ERROR_TYPE: &str = "error_type";
}
