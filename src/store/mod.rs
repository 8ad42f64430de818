//! Persistence store - the remote table service holding sessions and events
//!
//! The store is an external collaborator. [`PersistenceStore`] is the seam:
//! [`RestStore`] talks to a PostgREST-style table API over HTTP and
//! [`MemoryStore`] keeps rows in process for tests and local runs.

mod error;
mod memory;
mod records;
mod rest;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use records::{EventRecord, SessionRecord};
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Tables the service reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    SessionMetadata,
    EventLog,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::SessionMetadata => "session_metadata",
            Table::EventLog => "event_log",
        }
    }
    /// Column that identifies a row
    pub fn key_column(&self) -> &'static str {
        match self {
            Table::SessionMetadata => "session_id",
            Table::EventLog => "event_id",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }
}

/// Ascending sort on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

/// A remote structured-record service
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert one record and return it as stored
    async fn insert(&self, table: Table, record: Value) -> Result<Value, StoreError>;

    /// Rows matching every filter, optionally ordered
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Merge `patch` into every matching row and return the updated rows
    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError>;
}
