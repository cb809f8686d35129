//! Logging macros that set target to "gatehouse_proxy" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g., "gatehouse_proxy::server::handlers::postgres"), creating overly
//! verbose logger names for operators filtering proxy output. These macros
//! ensure all logs from this crate use a single "gatehouse_proxy" target.

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "gatehouse_proxy", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "gatehouse_proxy", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "gatehouse_proxy", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "gatehouse_proxy", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "gatehouse_proxy", $($arg)*) };
}
