//! Text notices relayed over the real-time channel

use std::fmt;

/// A server-generated text frame.
///
/// Every frame the relay writes to a client is one of these, rendered with
/// `Display` into a plain UTF-8 line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Acknowledgment sent back to the client that wrote the message
    Echo { text: String },

    /// A message relayed from another client
    Relay { from: String, text: String },

    /// A client left the chat
    Departure { client: String },
}

impl Notice {
    pub fn echo(text: impl Into<String>) -> Self {
        Notice::Echo { text: text.into() }
    }

    pub fn relay(from: impl Into<String>, text: impl Into<String>) -> Self {
        Notice::Relay {
            from: from.into(),
            text: text.into(),
        }
    }

    pub fn departure(client: impl Into<String>) -> Self {
        Notice::Departure {
            client: client.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Echo { text } => write!(f, "You wrote: {}", text),
            Notice::Relay { from, text } => write!(f, "Client #{} says: {}", from, text),
            Notice::Departure { client } => write!(f, "Client #{} left the chat", client),
        }
    }
}

impl From<Notice> for String {
    fn from(notice: Notice) -> Self {
        notice.to_string()
    }
}
