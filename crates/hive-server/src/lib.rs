//! Distribution server: the HTTP control surface plus the WebSocket
//! event fan-out for pool viewers.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | HTTP error taxonomy with stable machine-readable codes |
//! | [`metrics`] | Prometheus recorder install + metric name constants |
//! | [`routes`] | Router assembly, HTTP handlers, and the serve loop |
//! | [`ws`] | Per-viewer WebSocket: snapshot on connect, then live events |

pub mod error;
pub mod metrics;
pub mod routes;
pub mod ws;

pub use error::ApiError;
pub use routes::{AppState, router, serve};
