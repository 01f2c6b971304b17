//! Conversion from typed tables to Arrow RecordBatches.
//!
//! Each column maps onto one Arrow field whose type follows the inferred
//! column type. Empty cells become Arrow nulls.

use anyhow::{Result, bail};
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, NaiveDate};
use std::sync::Arc;

use crate::formats::schema::ColumnType;
use crate::formats::table::{Column, Table, Value};

/// Arrow type used to store a column of the given type
pub fn arrow_type(kind: ColumnType) -> DataType {
    match kind {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Date => DataType::Date32,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Text => DataType::Utf8,
    }
}

pub fn table_schema(table: &Table) -> Schema {
    Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.name(), arrow_type(c.kind()), c.nullable()))
            .collect::<Vec<_>>(),
    )
}

/// Convert a table to a single RecordBatch
pub fn table_to_record_batch(table: &Table) -> Result<RecordBatch> {
    let schema = Arc::new(table_schema(table));

    let arrays = table
        .columns()
        .iter()
        .map(column_to_array)
        .collect::<Result<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}

fn column_to_array(column: &Column) -> Result<ArrayRef> {
    let array: ArrayRef = match column.kind() {
        ColumnType::Integer => Arc::new(Int64Array::from(collect(column, |value| match value {
            Value::Integer(v) => Some(*v),
            _ => None,
        })?)),
        ColumnType::Float => Arc::new(Float64Array::from(collect(column, |value| match value {
            Value::Float(v) => Some(*v),
            _ => None,
        })?)),
        ColumnType::Date => Arc::new(Date32Array::from(collect(column, |value| match value {
            Value::Date(d) => Some(days_since_epoch(*d)),
            _ => None,
        })?)),
        ColumnType::Timestamp => {
            Arc::new(TimestampMicrosecondArray::from(collect(column, |value| {
                match value {
                    Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                }
            })?))
        }
        ColumnType::Text => Arc::new(StringArray::from(
            column
                .raw_cells()
                .iter()
                .map(|cell| (!cell.is_empty()).then_some(cell.as_str()))
                .collect::<Vec<_>>(),
        )),
    };

    Ok(array)
}

/// Collect the typed values of a column; every non-null value must convert
fn collect<T, F>(column: &Column, convert: F) -> Result<Vec<Option<T>>>
where
    F: Fn(&Value) -> Option<T>,
{
    let mut out = Vec::with_capacity(column.len());
    for (row, value) in column.values().enumerate() {
        if value.is_null() {
            out.push(None);
            continue;
        }
        match convert(&value) {
            Some(v) => out.push(Some(v)),
            None => bail!(
                "Column '{}' row {}: value '{}' is not {}",
                column.name(),
                row,
                value,
                column.kind().name()
            ),
        }
    }
    Ok(out)
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - DateTime::UNIX_EPOCH.date_naive()).num_days() as i32
}
