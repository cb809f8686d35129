//! MySQL wire protocol framing
//!
//! Packet layout on the wire: `[payload length: u24 LE][sequence: u8][payload]`.
//! The codec's frame unit is `[sequence, payload...]`, so the header counts
//! one byte fewer than the frame — see [`codec`] for the length correction
//! this implies on read and write.

pub mod codec;
pub mod packets;
