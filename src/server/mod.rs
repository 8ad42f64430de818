//! Server module - HTTP routes, WebSocket upgrade, and listener

mod connection;
mod error;
mod extract;
mod listener;
mod session;
mod state;

pub use connection::{ws_handler, WsQuery};
pub use error::ApiError;
pub use listener::{build_router, Server};
pub use state::AppState;
