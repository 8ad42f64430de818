//! A single live client connection

use super::error::HubError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Longest client identifier accepted on the upgrade path
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Identifier a client chose for itself when connecting.
///
/// Unique among live connections, but a client may reconnect under the same
/// or a different identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Validate a raw identifier taken from the upgrade path
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        if raw.is_empty() {
            return Err(HubError::Handshake("client id must not be empty".into()));
        }
        if raw.len() > MAX_CLIENT_ID_LEN {
            return Err(HubError::Handshake(format!(
                "client id longer than {} bytes",
                MAX_CLIENT_ID_LEN
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(HubError::Handshake(
                "client id contains control characters".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a connection. `Closed*` states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Connected,
    ClosedByPeer,
    ClosedByError,
    ClosedByServer,
}

impl ConnState {
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ConnState::ClosedByPeer | ConnState::ClosedByError | ConnState::ClosedByServer
        )
    }
}

/// Why a connection is leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the channel or the stream ended
    Peer,
    /// Reading from the peer failed
    Error,
    /// The server dropped the connection (explicit leave or failed send)
    Server,
}

impl CloseReason {
    pub fn state(self) -> ConnState {
        match self {
            CloseReason::Peer => ConnState::ClosedByPeer,
            CloseReason::Error => ConnState::ClosedByError,
            CloseReason::Server => ConnState::ClosedByServer,
        }
    }
}

/// The session a connection records its events against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBinding {
    pub session_id: Uuid,

    /// True when the hub opened the session and should close it on leave
    pub owned: bool,
}

/// A connected client
pub struct Connection {
    /// Distinguishes this connection from earlier ones under the same client id
    serial: Uuid,

    client_id: ClientId,

    /// Outbound queue drained by the connection's writer task
    sender: mpsc::Sender<String>,

    state: watch::Sender<ConnState>,

    session: OnceLock<SessionBinding>,

    /// Inbound messages relayed so far
    relayed: AtomicU64,

    /// Set by whoever records the leave and closes the session
    wrapped_up: AtomicBool,
}

impl Connection {
    /// Create a connection in the `Connecting` state
    pub fn new(client_id: ClientId, sender: mpsc::Sender<String>) -> Self {
        let (state, _) = watch::channel(ConnState::Connecting);
        Self {
            serial: Uuid::new_v4(),
            client_id,
            sender,
            state,
            session: OnceLock::new(),
            relayed: AtomicU64::new(0),
            wrapped_up: AtomicBool::new(false),
        }
    }

    pub fn serial(&self) -> Uuid {
        self.serial
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn state(&self) -> ConnState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Move `Connecting -> Connected`. Returns false if already past it.
    pub(crate) fn mark_connected(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnState::Connecting {
                *state = ConnState::Connected;
                true
            } else {
                false
            }
        })
    }

    /// Enter a terminal state. Only the first call wins.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = reason.state();
                true
            }
        })
    }

    /// Resolves once the connection reaches a terminal state
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(ConnState::is_closed).await;
    }

    /// Queue a frame for the writer task.
    ///
    /// Waits at most `timeout` for queue space; a zero timeout fails as soon
    /// as the queue is full.
    pub async fn send(&self, text: String, timeout: Duration) -> Result<(), HubError> {
        let result = if self.is_closed() {
            Err("connection closed")
        } else if timeout.is_zero() {
            self.sender.try_send(text).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => "outbound queue full",
                mpsc::error::TrySendError::Closed(_) => "channel closed",
            })
        } else {
            match tokio::time::timeout(timeout, self.sender.send(text)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err("channel closed"),
                Err(_) => Err("outbound queue full"),
            }
        };

        result.map_err(|reason| HubError::SendFailure {
            client: self.client_id.clone(),
            reason,
        })
    }

    /// Attach the session this connection records against. First call wins.
    pub fn bind_session(&self, binding: SessionBinding) -> bool {
        self.session.set(binding).is_ok()
    }

    pub fn session(&self) -> Option<SessionBinding> {
        self.session.get().copied()
    }

    pub(crate) fn count_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// True for exactly one caller, the one that wraps up the session
    pub(crate) fn claim_wrap_up(&self) -> bool {
        !self.wrapped_up.swap(true, Ordering::AcqRel)
    }

    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.client_id)
            .field("serial", &self.serial)
            .field("state", &self.state())
            .finish()
    }
}
