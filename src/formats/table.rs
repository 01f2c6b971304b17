//! Typed tables built from report blocks
//!
//! Columns keep the cell text exactly as it was read together with the
//! inferred column type. Typed values are produced on access, so widening a
//! column type while merging never loses the original text.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

use super::schema::{ColumnType, parse_date, parse_timestamp_or_date};
use crate::coordination::RunId;

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used for plotting; integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// A named column: raw cells plus the type inferred from them
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    inferred: Option<ColumnType>,
    nullable: bool,
    cells: Vec<String>,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type; a column with only null cells is text
    pub fn kind(&self) -> ColumnType {
        self.inferred.unwrap_or(ColumnType::Text)
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell text as read from the report (trimmed)
    pub fn raw(&self, row: usize) -> Option<&str> {
        self.cells.get(row).map(String::as_str)
    }

    pub fn raw_cells(&self) -> &[String] {
        &self.cells
    }

    pub fn value(&self, row: usize) -> Option<Value> {
        self.raw(row).map(|raw| self.parse(raw))
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.cells.iter().map(|raw| self.parse(raw))
    }

    fn parse(&self, raw: &str) -> Value {
        if raw.trim().is_empty() {
            return Value::Null;
        }

        // Every cell parses as the inferred type by construction; the text
        // fallback only guards hand-built columns.
        let parsed = match self.kind() {
            ColumnType::Integer => raw.parse().ok().map(Value::Integer),
            ColumnType::Float => raw.parse().ok().map(Value::Float),
            ColumnType::Date => parse_date(raw).map(Value::Date),
            ColumnType::Timestamp => parse_timestamp_or_date(raw).map(Value::Timestamp),
            ColumnType::Text => None,
        };

        parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
    }
}

/// Ordered named columns of equal length
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Raw cells of one row, in column order
    pub fn row(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.num_rows {
            return None;
        }
        Some(self.columns.iter().map(|c| c.cells[index].as_str()).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.num_rows).map(|i| self.columns.iter().map(|c| c.cells[i].as_str()).collect())
    }

    pub(crate) fn into_builder(self) -> TableBuilder {
        let mut builder = TableBuilder {
            names: Vec::with_capacity(self.columns.len()),
            inferred: Vec::with_capacity(self.columns.len()),
            nullable: Vec::with_capacity(self.columns.len()),
            cells: Vec::with_capacity(self.columns.len()),
            num_rows: self.num_rows,
        };
        for column in self.columns {
            builder.names.push(column.name);
            builder.inferred.push(column.inferred);
            builder.nullable.push(column.nullable);
            builder.cells.push(column.cells);
        }
        builder
    }
}

/// Append-only column store that infers types as rows arrive
///
/// Rows are stored column-major so appending a block costs one `extend` per
/// column and `finish` moves the buffers without copying.
#[derive(Debug, Clone)]
pub(crate) struct TableBuilder {
    names: Vec<String>,
    inferred: Vec<Option<ColumnType>>,
    nullable: Vec<bool>,
    cells: Vec<Vec<String>>,
    num_rows: usize,
}

impl TableBuilder {
    pub(crate) fn new(names: Vec<String>) -> Self {
        let width = names.len();
        Self {
            names,
            inferred: vec![None; width],
            nullable: vec![false; width],
            cells: vec![Vec::new(); width],
            num_rows: 0,
        }
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Append one row; the caller guarantees `row.len()` equals the width
    pub(crate) fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.names.len());
        for (idx, cell) in row.into_iter().enumerate() {
            let (inferred, has_null) = ColumnType::infer_column(self.inferred[idx], [cell.as_str()]);
            self.inferred[idx] = inferred;
            self.nullable[idx] |= has_null;
            self.cells[idx].push(cell);
        }
        self.num_rows += 1;
    }

    /// Append the rows of `table` after its first `skip` rows
    ///
    /// Types are re-inferred on the appended cells only, so skipped rows
    /// never widen a column. The caller checks that the columns match.
    pub(crate) fn extend_from(&mut self, table: &Table, skip: usize) -> usize {
        let skip = skip.min(table.num_rows);
        for (idx, column) in table.columns.iter().enumerate() {
            let kept = &column.cells[skip..];
            let (inferred, has_null) =
                ColumnType::infer_column(self.inferred[idx], kept.iter().map(String::as_str));
            self.inferred[idx] = inferred;
            self.nullable[idx] |= has_null;
            self.cells[idx].extend_from_slice(kept);
        }
        let appended = table.num_rows - skip;
        self.num_rows += appended;
        appended
    }

    pub(crate) fn finish(self) -> Table {
        let columns = self
            .names
            .into_iter()
            .zip(self.inferred)
            .zip(self.nullable)
            .zip(self.cells)
            .map(|(((name, inferred), nullable), cells)| Column {
                name,
                inferred,
                nullable,
                cells,
            })
            .collect();

        Table {
            columns,
            num_rows: self.num_rows,
        }
    }
}

/// The table parsed from one run's report
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    run: RunId,
    preamble: String,
    table: Table,
}

impl ParsedTable {
    pub(crate) fn new(run: RunId, preamble: String, table: Table) -> Self {
        Self {
            run,
            preamble,
            table,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// First line of the report, kept for diagnostics
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn build(names: &[&str], rows: &[&[&str]]) -> Table {
        let mut builder = TableBuilder::new(strings(names));
        for row in rows {
            builder.push_row(strings(row));
        }
        builder.finish()
    }

    #[test]
    fn test_builder_infers_types_per_column() {
        let table = build(
            &["ob_id", "airmass", "date", "status"],
            &[
                &["101", "1.21", "2012-03-28", "completed"],
                &["102", "", "2012-03-29", "executed"],
            ],
        );

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names(), vec!["ob_id", "airmass", "date", "status"]);

        let ob_id = table.column("ob_id").unwrap();
        assert_eq!(ob_id.kind(), ColumnType::Integer);
        assert!(!ob_id.nullable());
        assert_eq!(ob_id.value(1), Some(Value::Integer(102)));

        let airmass = table.column("airmass").unwrap();
        assert_eq!(airmass.kind(), ColumnType::Float);
        assert!(airmass.nullable());
        assert_eq!(airmass.value(1), Some(Value::Null));

        assert_eq!(table.column("date").unwrap().kind(), ColumnType::Date);
        assert_eq!(table.column("status").unwrap().kind(), ColumnType::Text);
    }

    #[test]
    fn test_all_null_column_is_text() {
        let table = build(&["comment"], &[&[""], &[""]]);
        let column = table.column("comment").unwrap();
        assert_eq!(column.kind(), ColumnType::Text);
        assert!(column.nullable());
    }

    #[test]
    fn test_extend_skips_leading_rows_and_widens() {
        let first = build(&["n"], &[&["1"], &["2"]]);
        let second = build(&["n"], &[&["units"], &["2.5"]]);

        let mut builder = first.into_builder();
        let appended = builder.extend_from(&second, 1);
        let merged = builder.finish();

        assert_eq!(appended, 1);
        assert_eq!(merged.num_rows(), 3);
        let column = merged.column("n").unwrap();
        assert_eq!(column.kind(), ColumnType::Float);
        assert_eq!(column.raw_cells(), &strings(&["1", "2", "2.5"])[..]);
        assert_eq!(column.value(0), Some(Value::Float(1.0)));
    }

    #[test]
    fn test_extend_with_fewer_rows_than_skip() {
        let first = build(&["n"], &[&["1"]]);
        let second = build(&["n"], &[&["2"]]);

        let mut builder = first.into_builder();
        assert_eq!(builder.extend_from(&second, 2), 0);
        assert_eq!(builder.finish().num_rows(), 1);
    }

    #[test]
    fn test_rows_iterate_in_order() {
        let table = build(&["a", "b"], &[&["1", "x"], &["2", "y"]]);
        let rows: Vec<Vec<&str>> = table.rows().collect();
        assert_eq!(rows, vec![vec!["1", "x"], vec!["2", "y"]]);
        assert_eq!(table.row(2), None);
    }
}
