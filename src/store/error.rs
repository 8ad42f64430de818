//! Persistence errors

use thiserror::Error;

/// Errors from the persistence store and its typed wrappers
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store URL or credential is missing
    #[error("Store is not configured: {0}")]
    Misconfigured(String),

    #[error("Store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed store record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Store returned no rows for insert into {0}")]
    EmptyInsert(&'static str),

    /// Injected by the in-memory store when writes are switched off
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
