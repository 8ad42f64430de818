//! Broadcast hub - live connection registry and real-time fan-out

mod connection;
mod error;
mod manager;
mod registry;

pub use connection::{
    ClientId, CloseReason, ConnState, Connection, SessionBinding, MAX_CLIENT_ID_LEN,
};
pub use error::HubError;
pub use manager::{Hub, SendPolicy};
pub use registry::Registry;
