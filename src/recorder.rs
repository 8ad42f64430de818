//! Session/event recorder - typed access to the persistence store

use crate::store::{
    EventRecord, Filter, Order, PersistenceStore, SessionRecord, StoreError, Table,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Turns sessions and events into store rows and back.
///
/// Never retries; a failed call is returned to the caller as is.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn PersistenceStore>,
}

impl Recorder {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    /// Insert a session row and return it as stored
    pub async fn create_session(&self, session: SessionRecord) -> Result<SessionRecord, StoreError> {
        let row = self
            .store
            .insert(Table::SessionMetadata, serde_json::to_value(&session)?)
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Open a new session for `user_id` starting now
    pub async fn start_session(&self, user_id: &str) -> Result<SessionRecord, StoreError> {
        self.create_session(SessionRecord::new(user_id)).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        let rows = self
            .store
            .select(
                Table::SessionMetadata,
                &[Filter::eq("session_id", session_id)],
                None,
            )
            .await?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Stamp `end_time` and `summary` on a session. `None` if it does not exist.
    pub async fn close_session(
        &self,
        session_id: Uuid,
        summary: Option<String>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let patch = json!({ "end_time": Utc::now(), "summary": summary });
        let rows = self
            .store
            .update(
                Table::SessionMetadata,
                &[Filter::eq("session_id", session_id)],
                patch,
            )
            .await?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Append an event row and return it as stored
    pub async fn create_event(&self, event: EventRecord) -> Result<EventRecord, StoreError> {
        let row = self
            .store
            .insert(Table::EventLog, serde_json::to_value(&event)?)
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Append an event stamped now and return its id
    pub async fn record_event(
        &self,
        session_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<Uuid, StoreError> {
        let event = self
            .create_event(EventRecord::new(session_id, event_type, payload))
            .await?;
        Ok(event.event_id)
    }

    /// Every event of a session, oldest first
    pub async fn events_for_session(&self, session_id: Uuid) -> Result<Vec<EventRecord>, StoreError> {
        let rows = self
            .store
            .select(
                Table::EventLog,
                &[Filter::eq("session_id", session_id)],
                Some(&Order::asc("timestamp")),
            )
            .await?;

        let mut events = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<EventRecord>, _>>()?;
        // Stable, so rows sharing a timestamp keep the store's order
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}
