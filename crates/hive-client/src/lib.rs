//! Viewer-side client: a reconnecting WebSocket stream consumer plus
//! the short-lived HTTP calls for actions.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`api`] | HTTP client for send/interrupt/running/pool calls |
//! | [`consumer`] | Reconnecting stream consumer with exponential backoff |
//! | [`state`] | Local view: pool snapshot + one [`ChatState`] per agent |
//!
//! [`ChatState`]: hive_core::ChatState

pub mod api;
pub mod consumer;
pub mod state;

pub use api::{ApiClient, ClientError};
pub use consumer::{ConnectionStatus, StreamConsumer, reconnect_delay};
pub use state::ViewState;
