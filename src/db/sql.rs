//! Helpers shared by the sqlx-backed sessions.

use std::fmt;

use sqlx::{Column as _, TypeInfo as _};

use super::{ColumnInfo, Value};
use crate::error::{ExtractError, Result};

/// Column metadata from a fetched row, names and types unmodified.
pub(crate) fn row_columns<R: sqlx::Row>(row: &R) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Column metadata from a prepared statement, used when a query returns no
/// rows so the table still carries its header.
pub(crate) fn statement_columns<'q, S: sqlx::Statement<'q>>(statement: &S) -> Vec<ColumnInfo> {
    statement
        .columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Decodes one cell through `map`. SQL NULL becomes [`Value::Null`]; a value
/// the Rust type cannot hold is a query error naming the column.
pub(crate) fn decode<'r, R, T, F>(row: &'r R, index: usize, label: &str, map: F) -> Result<Value>
where
    R: sqlx::Row,
    usize: sqlx::ColumnIndex<R>,
    T: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(value) => Ok(value.map(map).unwrap_or(Value::Null)),
        Err(e) => Err(decode_error(row, index, label, e)),
    }
}

/// A query error for a cell that could not be decoded.
pub(crate) fn decode_error<R: sqlx::Row>(
    row: &R,
    index: usize,
    label: &str,
    cause: impl fmt::Display,
) -> ExtractError {
    let (name, type_name) = row
        .columns()
        .get(index)
        .map(|col| (col.name().to_string(), col.type_info().name().to_string()))
        .unwrap_or_else(|| (index.to_string(), "?".to_string()));
    ExtractError::query(
        label,
        format!("cannot decode column '{name}' ({type_name}): {cause}"),
    )
}


#[cfg(test)]
pub(crate) mod sqlite {
    //! In-memory SQLite session exercising the real cursor path in tests.

    use async_trait::async_trait;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};
    use sqlx::{Connection, Executor, Row};

    use super::{row_columns, statement_columns};
    use crate::db::{BackendFamily, ConnectionHandle, CursorSession, TabularResult, Value};
    use crate::error::{ExtractError, Result};

    pub(crate) struct SqliteSession {
        conn: SqliteConnection,
    }

    impl SqliteSession {
        pub(crate) async fn open_in_memory() -> Self {
            let conn = SqliteConnection::connect("sqlite::memory:")
                .await
                .expect("in-memory sqlite");
            Self { conn }
        }

        /// A handle tagged like a MySQL-family cursor connection.
        pub(crate) async fn handle() -> ConnectionHandle {
            ConnectionHandle::cursor(
                "mysql",
                BackendFamily::MySql,
                Box::new(Self::open_in_memory().await),
            )
        }
    }

    fn convert_value(row: &SqliteRow, index: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            return v.into();
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            return v.into();
        }
        row.try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    #[async_trait]
    impl CursorSession for SqliteSession {
        async fn fetch_all(&mut self, sql: &str) -> Result<TabularResult> {
            let rows = sqlx::query(sql)
                .fetch_all(&mut self.conn)
                .await
                .map_err(|e| ExtractError::query("sqlite", e))?;

            let columns = match rows.first() {
                Some(row) => row_columns(row),
                None => {
                    let statement = (&mut self.conn)
                        .prepare(sql)
                        .await
                        .map_err(|e| ExtractError::query("sqlite", e))?;
                    statement_columns(&statement)
                }
            };

            let rows = rows
                .iter()
                .map(|row| (0..row.len()).map(|i| convert_value(row, i)).collect())
                .collect();

            Ok(TabularResult::with_data(columns, rows))
        }

        async fn close(self: Box<Self>) -> Result<()> {
            let Self { conn } = *self;
            conn.close()
                .await
                .map_err(|e| ExtractError::internal(e.to_string()))
        }
    }
}
