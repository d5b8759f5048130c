//! Typed access on top of the row-level `BackendService`.

use serde::Serialize;
use serde_json::Value;

use crate::domain::record::Record;

use super::{BackendError, BackendService, Filter, Query, Row};

pub fn decode<R: Record>(row: Row) -> Result<R, BackendError> {
    serde_json::from_value(Value::Object(row)).map_err(|error| BackendError::InvalidData {
        table: R::TABLE.to_owned(),
        details: error.to_string(),
    })
}

pub fn encode<T: Serialize>(table: &str, value: &T) -> Result<Row, BackendError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(BackendError::InvalidData {
            table: table.to_owned(),
            details: format!("expected an object, got {other}"),
        }),
        Err(error) => Err(BackendError::InvalidData {
            table: table.to_owned(),
            details: error.to_string(),
        }),
    }
}

/// Runs `query` against `R::TABLE`, ignoring whatever table the query names.
pub async fn fetch<R: Record>(
    backend: &dyn BackendService,
    mut query: Query,
) -> Result<Vec<R>, BackendError> {
    query.table = R::TABLE.to_owned();
    backend
        .query(query)
        .await?
        .into_iter()
        .map(decode::<R>)
        .collect()
}

pub async fn fetch_one<R: Record>(
    backend: &dyn BackendService,
    filters: Vec<Filter>,
) -> Result<Option<R>, BackendError> {
    backend
        .query_one(R::TABLE, filters)
        .await?
        .map(decode::<R>)
        .transpose()
}

/// Inserts `value` into `R::TABLE` and decodes the stored row.
pub async fn insert<R: Record, T: Serialize + Sync>(
    backend: &dyn BackendService,
    value: &T,
) -> Result<R, BackendError> {
    let row = encode(R::TABLE, value)?;
    decode(backend.insert(R::TABLE, row).await?)
}
