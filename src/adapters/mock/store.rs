//! In-memory data store for testing.
//!
//! Stores rows per table, enforces configured unique columns, records every
//! call together with the authorization that was installed when the call
//! was issued, and can inject latency and failures.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{DataStore, Filter, Row, StoreError};

/// Kind of store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Query,
    Insert,
    Update,
    Delete,
}

/// A recorded store call for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub op: StoreOp,
    pub table: String,
    pub filter: Option<Filter>,
    /// Authorization installed when the call was issued
    pub authorization: Option<String>,
}

/// In-memory data store for testing.
///
/// Clones share the same underlying tables, so a test can hand one clone
/// to the component under test and inspect another.
///
/// # Example
///
/// ```ignore
/// use idmirror::adapters::mock::InMemoryStore;
///
/// let store = InMemoryStore::new().with_unique("users", "clerk_id");
/// store.seed("users", serde_json::json!({ "clerk_id": "user_1" }));
///
/// // Simulate a slow network for one candidate
/// store.set_query_delay("cool_fox", Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<HashMap<String, Vec<Row>>>>,
    unique_columns: Arc<Mutex<HashMap<String, Vec<String>>>>,
    authorization: Arc<Mutex<Option<String>>>,
    authorization_history: Arc<Mutex<Vec<Option<String>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Applied to every operation
    latency: Arc<Mutex<Duration>>,
    /// Extra query latency keyed by the first filter value
    query_delays: Arc<Mutex<HashMap<String, Duration>>>,
    query_error: Arc<Mutex<Option<StoreError>>>,
    insert_error: Arc<Mutex<Option<StoreError>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce uniqueness of `column` in `table` on insert.
    pub fn with_unique(self, table: &str, column: &str) -> Self {
        self.unique_columns
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
        self
    }

    /// Insert a row directly, bypassing constraints and call recording.
    pub fn seed(&self, table: &str, row: Value) {
        if let Value::Object(row) = row {
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(row);
        }
    }

    /// All rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Currently installed authorization.
    pub fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    /// Every value passed to `set_authorization`, in order.
    pub fn authorization_history(&self) -> Vec<Option<String>> {
        self.authorization_history.lock().unwrap().clone()
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of kind `op`.
    pub fn count(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub fn query_count(&self) -> usize {
        self.count(StoreOp::Query)
    }

    pub fn insert_count(&self) -> usize {
        self.count(StoreOp::Insert)
    }

    /// Latency applied to every operation.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Extra latency for queries whose first filter value equals `value`.
    pub fn set_query_delay(&self, value: &str, delay: Duration) {
        self.query_delays
            .lock()
            .unwrap()
            .insert(value.to_string(), delay);
    }

    /// Make every query fail with `error` (or stop failing with `None`).
    pub fn set_query_error(&self, error: Option<StoreError>) {
        *self.query_error.lock().unwrap() = error;
    }

    /// Make every insert fail with `error` (or stop failing with `None`).
    pub fn set_insert_error(&self, error: Option<StoreError>) {
        *self.insert_error.lock().unwrap() = error;
    }

    fn record(&self, op: StoreOp, table: &str, filter: Option<&Filter>) {
        let authorization = self.authorization();
        self.calls.lock().unwrap().push(RecordedCall {
            op,
            table: table.to_string(),
            filter: filter.cloned(),
            authorization,
        });
    }

    async fn simulate_latency(&self, extra: Duration) {
        let total = *self.latency.lock().unwrap() + extra;
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }

    fn query_delay_for(&self, filter: &Filter) -> Duration {
        let key = match filter.conditions().first() {
            Some((_, Value::String(value))) => value.clone(),
            Some((_, value)) => value.to_string(),
            None => return Duration::ZERO,
        };
        self.query_delays
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    fn find_duplicate(&self, table: &str, record: &Row) -> Option<String> {
        let unique_columns = self.unique_columns.lock().unwrap();
        let tables = self.tables.lock().unwrap();
        let columns = unique_columns.get(table)?;
        let rows = tables.get(table)?;

        columns.iter().find_map(|column| {
            let value = record.get(column).filter(|v| !v.is_null())?;
            rows.iter()
                .any(|row| row.get(column) == Some(value))
                .then(|| format!("duplicate key value violates unique constraint \"{table}_{column}_key\""))
        })
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    fn set_authorization(&self, token: Option<&str>) {
        let token = token.map(str::to_string);
        *self.authorization.lock().unwrap() = token.clone();
        self.authorization_history.lock().unwrap().push(token);
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Row, StoreError> {
        self.record(StoreOp::Query, table, Some(filter));
        self.simulate_latency(self.query_delay_for(filter)).await;

        if let Some(err) = self.query_error.lock().unwrap().clone() {
            return Err(err);
        }

        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.iter().find(|row| filter.matches(row)).cloned())
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
            })
    }

    async fn insert(&self, table: &str, mut record: Row) -> Result<Row, StoreError> {
        self.record(StoreOp::Insert, table, None);
        self.simulate_latency(Duration::ZERO).await;

        if let Some(err) = self.insert_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(message) = self.find_duplicate(table, &record) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                message,
            });
        }

        record
            .entry("created_at")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        self.record(StoreOp::Update, table, Some(filter));
        self.simulate_latency(Duration::ZERO).await;

        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        self.record(StoreOp::Delete, table, Some(filter));
        self.simulate_latency(Duration::ZERO).await;

        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }
}
