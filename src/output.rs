//! Plain-text table preview for the terminal.

use crate::db::TabularResult;

/// Renders the first `limit` rows of a table with aligned columns.
pub fn format_preview(table: &TabularResult, limit: usize) -> String {
    if table.columns.is_empty() {
        return String::new();
    }

    let headers = table.column_names();
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(limit)
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(&header_line.join(" │ "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in &rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(row_line.join(" │ ").trim_end());
        output.push('\n');
    }

    if table.row_count() > limit {
        output.push_str(&format!("… {} more rows\n", table.row_count() - limit));
    }
    output.push_str(&format!("({} rows)", table.row_count()));
    output
}
