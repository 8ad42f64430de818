//! switchboard - a real-time WebSocket relay with session and event recording
//!
//! This crate provides:
//! - A broadcast hub tracking live connections and fanning messages out
//! - A recorder that writes sessions and events to a remote table store
//! - HTTP endpoints for sessions and events, and the WebSocket upgrade
//! - Configuration management
//!
//! # Architecture
//!
//! Each WebSocket connection runs its own receive loop. For every inbound
//! message the [`hub::Hub`] echoes to the sender, records an event against the
//! sender's session, and relays the message to every other live connection.
//! A failed send to one client drops that client only.

pub mod config;
pub mod hub;
pub mod protocol;
pub mod recorder;
pub mod server;
pub mod store;
