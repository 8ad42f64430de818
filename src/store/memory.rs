//! In-process table store

use super::{Filter, Order, PersistenceStore, StoreError, Table};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Rows kept in memory, per table, in insertion order
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, Vec<Value>>>,

    /// When set, every call fails with `StoreError::Unavailable`
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail, to exercise outage handling
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn row_count(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

/// Text form of a column value, as the REST API compares it
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| {
        row.get(&f.column)
            .map(|v| as_text(v) == f.value)
            .unwrap_or(false)
    })
}

/// Rejects what the remote store's keys would: a repeated row key, or an
/// event whose session does not exist. Both answer 409 there.
fn check_constraints(
    tables: &HashMap<Table, Vec<Value>>,
    table: Table,
    record: &Value,
) -> Result<(), StoreError> {
    let key = table.key_column();
    let exists = |table: Table, column: &str, value: &Value| {
        tables
            .get(&table)
            .is_some_and(|rows| rows.iter().any(|r| r.get(column) == Some(value)))
    };

    if let Some(value) = record.get(key) {
        if exists(table, key, value) {
            return Err(StoreError::Status {
                status: 409,
                body: format!("duplicate key {}={} in {}", key, as_text(value), table),
            });
        }
    }

    if table == Table::EventLog {
        let parent = Table::SessionMetadata.key_column();
        let known = record
            .get(parent)
            .is_some_and(|value| exists(Table::SessionMetadata, parent, value));
        if !known {
            return Err(StoreError::Status {
                status: 409,
                body: format!("{} does not reference a row in {}", parent, Table::SessionMetadata),
            });
        }
    }

    Ok(())
}

/// Order two column values, reading RFC 3339 strings as instants
fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (
                a.parse::<DateTime<Utc>>(),
                b.parse::<DateTime<Utc>>(),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(a), Some(b)) => as_text(a).cmp(&as_text(b)),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn insert(&self, table: Table, record: Value) -> Result<Value, StoreError> {
        self.check_available()?;
        if !record.is_object() {
            return Err(StoreError::Status {
                status: 400,
                body: format!("record for {} must be a JSON object", table),
            });
        }

        let mut tables = self.tables.write().await;
        check_constraints(&tables, table, &record)?;
        tables.entry(table).or_default().push(record.clone());
        Ok(record)
    }

    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| row_matches(r, filters)).cloned().collect())
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = order {
            rows.sort_by(|a, b| compare(a.get(&order.column), b.get(&order.column)));
        }

        Ok(rows)
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;
        let Some(patch) = patch.as_object() else {
            return Err(StoreError::Status {
                status: 400,
                body: "patch must be a JSON object".into(),
            });
        };

        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| row_matches(r, filters)) {
                if let Some(fields) = row.as_object_mut() {
                    for (key, value) in patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }
}
