//! Session lifecycle: shutdown scheduling and the frame relay loop.

mod relay;
mod scheduler;

pub use relay::{relay_frames, RelayContext};
pub use scheduler::{compute_expiry, is_session_expired, DisconnectReason, ShutdownScheduler};
