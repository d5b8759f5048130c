//! Backend integration layer: the data-service boundary and its adapters.

pub mod memory;
pub mod records;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryBackend;

/// A single backend row. Every table stores JSON objects.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn any_of<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    /// Missing columns compare as `null`.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(field, value) => row.get(field).unwrap_or(&Value::Null) == value,
            Self::In(field, values) => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                values.iter().any(|value| value == actual)
            }
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(row)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Filtered, sorted page request against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            sort: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Row),
    Update(Row),
    Delete(Row),
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A standing live feed. Events stop arriving once the backend drops its
/// sender or the subscription is released with `unsubscribe`.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("the service is unreachable, check your connection and try again")]
    Unavailable,
    #[error("the requested {table} record does not exist")]
    NotFound { table: String },
    #[error("a conflicting {table} record already exists")]
    Conflict { table: String },
    #[error("the service returned unreadable {table} data ({details})")]
    InvalidData { table: String, details: String },
}

/// The external data service the sync components talk to.
///
/// Every call is a suspension point; implementations never block the
/// event loop.
#[async_trait]
pub trait BackendService: Send + Sync {
    async fn query(&self, query: Query) -> Result<Vec<Row>, BackendError>;

    async fn query_one(&self, table: &str, filters: Vec<Filter>)
        -> Result<Option<Row>, BackendError>;

    /// Returns the stored row including server-assigned id and timestamp.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    /// Returns every row the patch was applied to.
    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Row,
    ) -> Result<Vec<Row>, BackendError>;

    /// Returns the removed rows.
    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<Vec<Row>, BackendError>;

    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<Subscription, BackendError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError>;
}

/// Returns the backend module name for smoke checks.
pub fn module_name() -> &'static str {
    "backend"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[test]
    fn eq_filter_treats_missing_column_as_null() {
        let filter = Filter::eq("region", Value::Null);

        assert!(filter.matches(&row(json!({ "id": "p1" }))));
        assert!(!filter.matches(&row(json!({ "id": "p1", "region": "Analamanga" }))));
    }

    #[test]
    fn in_filter_matches_any_listed_value() {
        let filter = Filter::any_of("farmer_id", ["u1", "u3"]);

        assert!(filter.matches(&row(json!({ "farmer_id": "u3" }))));
        assert!(!filter.matches(&row(json!({ "farmer_id": "u2" }))));
    }

    #[test]
    fn in_filter_with_no_values_matches_nothing() {
        let filter = Filter::any_of("farmer_id", Vec::<String>::new());

        assert!(!filter.matches(&row(json!({ "farmer_id": "u1" }))));
    }

    #[test]
    fn or_filter_matches_when_any_branch_matches() {
        let filter = Filter::or([
            Filter::eq("participant_a", "u1"),
            Filter::eq("participant_b", "u1"),
        ]);

        assert!(filter.matches(&row(json!({ "participant_a": "u0", "participant_b": "u1" }))));
        assert!(!filter.matches(&row(json!({ "participant_a": "u0", "participant_b": "u2" }))));
    }

    #[test]
    fn query_builder_sets_page_window() {
        let query = Query::table("projects")
            .filter(Filter::eq("status", "funding"))
            .sort(Sort::descending("created_at"))
            .page(20, 10);

        assert_eq!(query.offset, 20);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.sort, Some(Sort::descending("created_at")));
        assert_eq!(query.filters.len(), 1);
    }
}
