//! Hub-level errors

use super::ClientId;
use thiserror::Error;

/// Errors raised by the broadcast hub
#[derive(Debug, Error)]
pub enum HubError {
    /// The upgrade could not complete; nothing was registered
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Client '{0}' is already connected")]
    DuplicateIdentifier(ClientId),

    /// The connection was dropped before its join finished
    #[error("Client '{0}' was disconnected while joining")]
    JoinAborted(ClientId),

    /// A write to one connection failed; the hub turns this into a leave
    #[error("Send to client '{client}' failed: {reason}")]
    SendFailure {
        client: ClientId,
        reason: &'static str,
    },
}
