//! Query execution and result normalization.
//!
//! Cursor sessions already produce a table; wide-column sessions produce a
//! list of records that are folded into one here.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::db::{ColumnInfo, ConnectionHandle, Record, Row, Session, TabularResult, Value};
use crate::error::Result;

/// Runs `query` on the handle and returns the full result as a table.
///
/// Failures propagate unchanged; no partial table is produced.
pub async fn execute(handle: &mut ConnectionHandle, query: &str) -> Result<TabularResult> {
    let label = handle.label().to_string();
    debug!("Executing query on {}: {}", label, query);

    let start = Instant::now();
    let table = match handle.session_mut() {
        Session::Cursor(session) => session.fetch_all(query).await?,
        Session::WideColumn(session) => fold_records(session.fetch_records(query).await?),
    };
    let execution_time = start.elapsed();

    info!(
        "Fetched {} rows, {} columns from {} in {:?}",
        table.row_count(),
        table.columns.len(),
        label,
        execution_time
    );
    Ok(table.with_execution_time(execution_time))
}

/// Folds wide-column records into a table.
///
/// Columns are the union of field names in order of first appearance; a
/// field missing from a record is null. A column's type is that of its first
/// non-null value. If a record repeats a field, its last value wins.
pub fn fold_records(records: Vec<Record>) -> TabularResult {
    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in &records {
        for (name, value) in record {
            let index = *positions.entry(name.clone()).or_insert_with(|| {
                columns.push(ColumnInfo::new(name.clone(), "null"));
                columns.len() - 1
            });
            if columns[index].data_type == "null" && !value.is_null() {
                columns[index].data_type = value.type_name().to_string();
            }
        }
    }

    let rows: Vec<Row> = records
        .into_iter()
        .map(|record| {
            let mut row = vec![Value::Null; columns.len()];
            for (name, value) in record {
                if let Some(&index) = positions.get(&name) {
                    row[index] = value;
                }
            }
            row
        })
        .collect();

    TabularResult::with_data(columns, rows)
}
