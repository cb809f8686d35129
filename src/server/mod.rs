//! Session servers: per-dialect handlers, the relay loop, the shutdown
//! scheduler, and the connection correlator for the dual-adapter shape.

pub mod correlator;
pub mod handlers;
pub mod session;
pub mod stream;

pub use correlator::{ConnectionCorrelator, ConnectionId};
pub use handlers::{MysqlRelayProxy, PostgresProxy};
pub use session::{compute_expiry, is_session_expired, DisconnectReason, ShutdownScheduler};
pub use stream::NetworkStream;
