//! PostgreSQL wire protocol (v3)
//!
//! Frame layout: `[tag: u8][length: u32 BE][payload]`, where the length
//! counts itself plus the payload but not the tag. The startup message is
//! the single untagged frame.

pub mod auth;
pub mod codec;
pub mod constants;
pub mod messages;
