//! Wire conventions for the real-time channel
//!
//! The relay speaks plain UTF-8 text frames in both directions. Clients send
//! arbitrary text; the server answers with [`Notice`] lines.

mod message;

pub use message::Notice;

/// Default cap on a single inbound frame (64 KiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Event types written to the event log by the relay
pub mod event_type {
    pub const JOIN: &str = "join";
    pub const MESSAGE: &str = "message";
    pub const LEAVE: &str = "leave";
}
