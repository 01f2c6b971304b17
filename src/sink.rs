//! Persistence of raw reports, tables and the invocation manifest

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::config::{DATE_DIR_FORMAT, RAW_SUBDIR};
use crate::coordination::manifest::InvocationManifest;
use crate::formats::delimited::{DelimitedConfig, write_delimited};
use crate::formats::parquet::write_parquet;
use crate::formats::table::Table;
use crate::io::RunBlock;
use crate::io::uri::report_file_name;

/// Output format of a stored table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// CSV text
    Text,
    /// Apache Parquet
    ColumnarBinary,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Text => "csv",
            TableFormat::ColumnarBinary => "parquet",
        }
    }

    pub const ALL: [TableFormat; 2] = [TableFormat::Text, TableFormat::ColumnarBinary];
}

/// Storage for everything an invocation produces
///
/// `logical_name` is the run resource (`179A2010B`) for per-run tables and
/// the programme id for the summary.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Store a fetched report verbatim
    async fn write_raw(&self, block: &RunBlock) -> Result<PathBuf>;

    async fn write_table(
        &self,
        table: &Table,
        logical_name: &str,
        format: TableFormat,
    ) -> Result<PathBuf>;

    async fn write_manifest(&self, manifest: &InvocationManifest) -> Result<PathBuf>;
}

/// Writes into one dated directory below the output root
///
/// Directory structure:
///   {output_root}/{YYYYMMDD}/raw/{resource}.csv
///   {output_root}/{YYYYMMDD}/{logical_name}.csv
///   {output_root}/{YYYYMMDD}/{logical_name}.parquet
///   {output_root}/{YYYYMMDD}/{program_id}.manifest.json
#[derive(Debug, Clone)]
pub struct LocalSink {
    dir: PathBuf,
}

impl LocalSink {
    pub fn new(output_root: impl AsRef<Path>, date: NaiveDate) -> Self {
        Self {
            dir: dated_dir(output_root.as_ref(), date),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.dir.join(RAW_SUBDIR)
    }

    pub fn table_path(&self, logical_name: &str, format: TableFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", logical_name, format.extension()))
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// `{output_root}/{YYYYMMDD}`
pub fn dated_dir(output_root: &Path, date: NaiveDate) -> PathBuf {
    output_root.join(date.format(DATE_DIR_FORMAT).to_string())
}

#[async_trait]
impl TableSink for LocalSink {
    async fn write_raw(&self, block: &RunBlock) -> Result<PathBuf> {
        let path = self.raw_dir().join(report_file_name(block.resource()));
        self.write_bytes(&path, block.body().as_bytes()).await?;
        Ok(path)
    }

    async fn write_table(
        &self,
        table: &Table,
        logical_name: &str,
        format: TableFormat,
    ) -> Result<PathBuf> {
        let mut buffer = Vec::new();
        match format {
            TableFormat::Text => write_delimited(table, DelimitedConfig::csv(), &mut buffer)?,
            TableFormat::ColumnarBinary => write_parquet(table, &mut buffer)?,
        }

        let path = self.table_path(logical_name, format);
        self.write_bytes(&path, &buffer).await?;
        Ok(path)
    }

    async fn write_manifest(&self, manifest: &InvocationManifest) -> Result<PathBuf> {
        let json =
            serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
        let path = self
            .dir
            .join(format!("{}.manifest.json", manifest.program_id));
        self.write_bytes(&path, json.as_bytes()).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::RunId;
    use crate::formats::table::TableBuilder;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2012, 3, 28).unwrap()
    }

    #[tokio::test]
    async fn test_layout_under_dated_directory() {
        let temp_dir = TempDir::new().unwrap();
        let sink = LocalSink::new(temp_dir.path(), date());
        assert_eq!(sink.dir(), temp_dir.path().join("20120328"));

        let block = RunBlock::new(RunId::FIRST, "179A2010A".to_string(), "pre\r\nid\r\n1".into());
        let raw = sink.write_raw(&block).await.unwrap();
        assert_eq!(raw, temp_dir.path().join("20120328/raw/179A2010A.csv"));
        assert_eq!(std::fs::read_to_string(&raw).unwrap(), "pre\r\nid\r\n1");

        let mut builder = TableBuilder::new(vec!["id".into()]);
        builder.push_row(vec!["1".into()]);
        let table = builder.finish();

        let text = sink
            .write_table(&table, "179A2010A", TableFormat::Text)
            .await
            .unwrap();
        assert_eq!(text, temp_dir.path().join("20120328/179A2010A.csv"));
        assert_eq!(std::fs::read_to_string(&text).unwrap(), "id\n1\n");

        let binary = sink
            .write_table(&table, "179A2010", TableFormat::ColumnarBinary)
            .await
            .unwrap();
        assert_eq!(binary, temp_dir.path().join("20120328/179A2010.parquet"));
        // Parquet files start and end with the PAR1 magic
        let bytes = std::fs::read(&binary).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
    }

    #[test]
    fn test_extensions() {
        assert_eq!(TableFormat::Text.extension(), "csv");
        assert_eq!(TableFormat::ColumnarBinary.extension(), "parquet");
    }
}
