//! # s4-server
//!
//! Axum HTTP + WebSocket relay between robots and operator clients.
//!
//! - [`websocket`]: per-connection state, registry, role-targeted fan-out,
//!   the shared liveness monitor and the session loop
//! - [`relay`]: frame classification, message handlers, telemetry history
//!   and counters
//! - [`server`]: routes, listener and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use relay::{Relay, RelayConfig, RelayStats, RouteOutcome};
pub use server::RelayServer;
