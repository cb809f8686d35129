//! Statement auditing
//!
//! Every SQL statement extracted from a session's frontend stream is handed
//! to an [`AuditSink`] together with the execution-request and acting-user
//! identities, before the statement's frame is forwarded to the backend.
//! The sink is an explicit constructor argument of the session, never
//! ambient state.

mod event;
mod sink;

pub use event::AuditEvent;
pub use sink::{AuditSink, FileSink, MemorySink, TracingSink};
