//! Rows of the `session_metadata` and `event_log` tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One user interaction period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default = "Uuid::new_v4")]
    pub session_id: Uuid,

    pub user_id: String,

    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,

    /// Set once, when the session closes
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub summary: Option<String>,
}

impl SessionRecord {
    /// A fresh open session starting now
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            start_time: Utc::now(),
            end_time: None,
            summary: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }
}

/// An append-only record of something that happened in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,

    pub session_id: Uuid,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    pub event_type: String,

    #[serde(default)]
    pub event_data: Value,
}

impl EventRecord {
    pub fn new(session_id: Uuid, event_type: impl Into<String>, event_data: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            event_type: event_type.into(),
            event_data,
        }
    }
}
