//! Metric name constants, shared by every crate that records or
//! renders them.
//!
//! A single definition per name: the recording sites and the
//! `/metrics` surface cannot drift apart via a typo.

/// Agent turns completed total (counter).
pub const AGENT_TURNS_TOTAL: &str = "agent_turns_total";
/// Agent turns currently in flight (gauge).
pub const AGENT_TURNS_ACTIVE: &str = "agent_turns_active";
/// Side-channel messages relayed to the broker (counter).
pub const BROKER_PUBLISHES_TOTAL: &str = "broker_publishes_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Events dropped on slow viewers (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
