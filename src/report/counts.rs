use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::formats::table::Table;

/// Number of rows per distinct value of `column`
///
/// Ordered by descending count, ties by ascending value. Null cells are
/// counted under the empty string.
pub fn column_value_counts(table: &Table, column: &str) -> Result<IndexMap<String, usize>> {
    let col = table
        .column(column)
        .ok_or_else(|| anyhow!("Unknown column '{}'; columns are {:?}", column, table.column_names()))?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for cell in col.raw_cells() {
        *counts.entry(cell.as_str()).or_default() += 1;
    }

    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    Ok(sorted
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect())
}
