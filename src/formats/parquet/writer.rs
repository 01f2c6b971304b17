//! Parquet file writer.

use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::io::Write;
use std::sync::Arc;

use super::conversion::{table_schema, table_to_record_batch};
use crate::formats::table::Table;

/// Write `table` as a single row group Parquet file
pub fn write_parquet<W: Write + Send>(table: &Table, out: W) -> Result<()> {
    let batch = table_to_record_batch(table).context("Failed to convert table to Arrow")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(out, Arc::new(table_schema(table)), Some(props))
        .context("Failed to create Parquet writer")?;

    writer.write(&batch).context("Failed to write record batch")?;
    writer.close().context("Failed to finish Parquet file")?;
    Ok(())
}
