use anyhow::{Context, Result};
use std::io::Write;

use super::parser::DelimitedConfig;
use crate::formats::table::Table;

/// Write `table` as delimited text: the header row, then one row per record
///
/// Cells are written as they were read; the writer quotes only where needed.
pub fn write_delimited<W: Write>(table: &Table, config: DelimitedConfig, out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote)
        .from_writer(out);

    writer
        .write_record(table.column_names())
        .context("Failed to write header row")?;

    for (idx, row) in table.rows().enumerate() {
        writer
            .write_record(&row)
            .with_context(|| format!("Failed to write row {}", idx))?;
    }

    writer.flush().context("Failed to flush delimited output")?;
    Ok(())
}

pub fn to_csv_string(table: &Table) -> Result<String> {
    let mut buffer = Vec::new();
    write_delimited(table, DelimitedConfig::csv(), &mut buffer)?;
    String::from_utf8(buffer).context("CSV output is not valid UTF-8")
}
