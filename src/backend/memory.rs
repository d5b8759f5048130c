//! In-process `BackendService` used by the CLI demo and the test suite.
//!
//! Tables are vectors of JSON rows kept in insertion order. Every call
//! yields to the scheduler once before touching state so callers observe
//! the same suspension points they would against a remote service.

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    BackendError, BackendService, ChangeEvent, Filter, Query, Row, Subscription, SubscriptionId,
};
#[cfg(test)]
use super::records;
#[cfg(test)]
use crate::domain::record::Record;

const DEFAULT_TIMESTAMP_COLUMN: &str = "created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    QueryOne,
    Insert,
    Update,
    Delete,
    Subscribe,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    timestamp_columns: HashMap<String, String>,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    column_defaults: HashMap<String, Vec<(String, Value)>>,
    offline: bool,
    subscribers: Vec<Subscriber>,
    #[cfg(test)]
    faults: Vec<Fault>,
    #[cfg(test)]
    calls: HashMap<(String, Operation), usize>,
    next_row_id: u64,
    next_subscription_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

struct Subscriber {
    id: SubscriptionId,
    table: String,
    filter: Option<Filter>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[cfg(test)]
struct Fault {
    table: String,
    operation: Operation,
    error: BackendError,
    remaining: Option<usize>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryBackend")
            .field("tables", &state.tables.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column the backend stamps with the insert time when the row omits it.
    pub fn with_timestamp_column(self, table: &str, column: &str) -> Self {
        self.state()
            .timestamp_columns
            .insert(table.to_owned(), column.to_owned());
        self
    }

    /// Value stored for `column` when a seeded or inserted row omits it.
    pub fn with_default(self, table: &str, column: &str, value: impl Into<Value>) -> Self {
        self.state()
            .column_defaults
            .entry(table.to_owned())
            .or_default()
            .push((column.to_owned(), value.into()));
        self
    }

    /// Rejects inserts whose values for `columns` match an existing row.
    pub fn with_unique(self, table: &str, columns: &[&str]) -> Self {
        self.state()
            .unique_keys
            .entry(table.to_owned())
            .or_default()
            .push(columns.iter().map(|column| (*column).to_owned()).collect());
        self
    }

    /// Stores rows without stamping ids or notifying subscribers. Column
    /// defaults still apply.
    pub fn seed_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.state();
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                state.apply_defaults(table, &mut row);
                row
            })
            .collect();
        state.tables.entry(table.to_owned()).or_default().extend(rows);
    }

    /// While offline every call fails with `BackendError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Yields once, then records the call and applies any injected fault.
    async fn enter(&self, table: &str, operation: Operation) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        tracing::trace!(table, operation = ?operation, "backend call");

        #[cfg(test)]
        self.record_call(table, operation)?;

        if self.state().offline {
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }
}

/// Seeding, inspection and fault injection for tests.
#[cfg(test)]
impl MemoryBackend {
    pub fn seed<R: Record>(&self, records: &[R]) -> Result<(), BackendError> {
        let rows = records
            .iter()
            .map(|record| records::encode(R::TABLE, record))
            .collect::<Result<Vec<_>, _>>()?;
        self.seed_rows(R::TABLE, rows);
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Makes every `operation` on `table` fail.
    pub fn fail(&self, table: &str, operation: Operation, error: BackendError) {
        self.push_fault(table, operation, error, None);
    }

    pub fn fail_times(&self, table: &str, operation: Operation, error: BackendError, times: usize) {
        self.push_fault(table, operation, error, Some(times));
    }

    pub fn call_count(&self, table: &str, operation: Operation) -> usize {
        self.state()
            .calls
            .get(&(table.to_owned(), operation))
            .copied()
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        state.subscribers.len()
    }

    /// Pushes an insert event for `row` to live subscribers without storing
    /// it, as a redelivered notification would.
    pub fn redeliver_insert(&self, table: &str, row: Row) {
        self.state().notify(table, ChangeEvent::Insert(row));
    }

    fn record_call(&self, table: &str, operation: Operation) -> Result<(), BackendError> {
        let mut state = self.state();
        *state
            .calls
            .entry((table.to_owned(), operation))
            .or_default() += 1;
        state.take_fault(table, operation)
    }

    fn push_fault(
        &self,
        table: &str,
        operation: Operation,
        error: BackendError,
        remaining: Option<usize>,
    ) {
        self.state().faults.push(Fault {
            table: table.to_owned(),
            operation,
            error,
            remaining,
        });
    }
}

impl MemoryState {
    #[cfg(test)]
    fn take_fault(&mut self, table: &str, operation: Operation) -> Result<(), BackendError> {
        let Some(index) = self
            .faults
            .iter()
            .position(|fault| fault.table == table && fault.operation == operation)
        else {
            return Ok(());
        };

        let fault = &mut self.faults[index];
        let error = fault.error.clone();
        let exhausted = match fault.remaining.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.faults.remove(index);
        }

        Err(error)
    }

    fn apply_defaults(&self, table: &str, row: &mut Row) {
        for (column, value) in self.column_defaults.get(table).into_iter().flatten() {
            row.entry(column.clone()).or_insert_with(|| value.clone());
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let stamped = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamped);
        stamped
    }

    fn violates_unique(&self, table: &str, row: &Row) -> bool {
        let Some(existing) = self.tables.get(table) else {
            return false;
        };

        let same_id = row
            .get("id")
            .is_some_and(|id| existing.iter().any(|other| other.get("id") == Some(id)));
        if same_id {
            return true;
        }

        self.unique_keys
            .get(table)
            .into_iter()
            .flatten()
            .any(|columns| {
                existing.iter().any(|other| {
                    columns
                        .iter()
                        .all(|column| other.get(column) == row.get(column))
                })
            })
    }

    fn notify(&mut self, table: &str, event: ChangeEvent) {
        let row = match &event {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) | ChangeEvent::Delete(row) => {
                row.clone()
            }
        };

        self.subscribers.retain(|subscriber| {
            if subscriber.table != table
                || !subscriber
                    .filter
                    .as_ref()
                    .map_or(true, |filter| filter.matches(&row))
            {
                return !subscriber.tx.is_closed();
            }

            subscriber.tx.send(event.clone()).is_ok()
        });
    }
}

#[async_trait]
impl BackendService for MemoryBackend {
    async fn query(&self, query: Query) -> Result<Vec<Row>, BackendError> {
        self.enter(&query.table, Operation::Query).await?;

        let state = self.state();
        let mut rows: Vec<Row> = state
            .tables
            .get(&query.table)
            .into_iter()
            .flatten()
            .filter(|row| query.filters.iter().all(|filter| filter.matches(row)))
            .cloned()
            .collect();

        if let Some(sort) = &query.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn query_one(
        &self,
        table: &str,
        filters: Vec<Filter>,
    ) -> Result<Option<Row>, BackendError> {
        self.enter(table, Operation::QueryOne).await?;

        Ok(self
            .state()
            .tables
            .get(table)
            .into_iter()
            .flatten()
            .find(|row| filters.iter().all(|filter| filter.matches(row)))
            .cloned())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        self.enter(table, Operation::Insert).await?;

        let mut state = self.state();
        if row.get("id").map_or(true, Value::is_null) {
            state.next_row_id += 1;
            let id = format!("{table}-{}", state.next_row_id);
            row.insert("id".to_owned(), Value::String(id));
        }

        let column = state
            .timestamp_columns
            .get(table)
            .cloned()
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_COLUMN.to_owned());
        if row.get(&column).map_or(true, Value::is_null) {
            let stamp = state.next_timestamp();
            row.insert(
                column,
                Value::String(stamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }

        state.apply_defaults(table, &mut row);
        if state.violates_unique(table, &row) {
            return Err(BackendError::Conflict {
                table: table.to_owned(),
            });
        }

        state
            .tables
            .entry(table.to_owned())
            .or_default()
            .push(row.clone());
        state.notify(table, ChangeEvent::Insert(row.clone()));

        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Row,
    ) -> Result<Vec<Row>, BackendError> {
        self.enter(table, Operation::Update).await?;

        let mut state = self.state();
        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows
                .iter_mut()
                .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }

        for row in &updated {
            state.notify(table, ChangeEvent::Update(row.clone()));
        }

        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<Vec<Row>, BackendError> {
        self.enter(table, Operation::Delete).await?;

        let mut state = self.state();
        let mut removed = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| {
                let matched = filters.iter().all(|filter| filter.matches(row));
                if matched {
                    removed.push(row.clone());
                }
                !matched
            });
        }

        for row in &removed {
            state.notify(table, ChangeEvent::Delete(row.clone()));
        }

        Ok(removed)
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<Subscription, BackendError> {
        self.enter(table, Operation::Subscribe).await?;

        let mut state = self.state();
        state.next_subscription_id += 1;
        let id = SubscriptionId(state.next_subscription_id);
        let (tx, events) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            id,
            table: table.to_owned(),
            filter,
            tx,
        });

        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        if state.subscribers.len() == before {
            return Err(BackendError::NotFound {
                table: "subscriptions".to_owned(),
            });
        }
        Ok(())
    }
}

/// Orders JSON values for sorting. Nulls sort first; strings that both
/// parse as RFC 3339 timestamps compare chronologically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
