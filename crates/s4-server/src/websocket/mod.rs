//! WebSocket transport: connections, registry, fan-out, liveness, sessions.

pub mod connection;
pub mod fanout;
pub mod heartbeat;
pub mod registry;
pub mod session;

pub use connection::{ClientConnection, ClientId, Outbound, SendOutcome};
pub use fanout::FanOut;
pub use heartbeat::SweepReport;
pub use registry::ConnectionRegistry;
