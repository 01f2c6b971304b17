use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::accumulator::SummaryTable;
use crate::formats::table::Table;
use crate::telemetry::IngestStats;

/// Summary column definition (JSON serialization format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnJson {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    pub nullable: bool,
}

impl ColumnJson {
    pub fn from_table(table: &Table) -> Vec<Self> {
        table
            .columns()
            .iter()
            .map(|c| ColumnJson {
                name: c.name().to_string(),
                col_type: c.kind().name().to_string(),
                nullable: c.nullable(),
            })
            .collect()
    }
}

/// Where the reports of an invocation came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceJson {
    Portal { url: String },
    Replay { dir: PathBuf },
}

/// The manifest file written next to the summary of an invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationManifest {
    pub invocation_id: String,
    pub created_at: String, // ISO 8601
    pub program_id: String,
    pub source: SourceJson,
    pub layout: String,
    pub skip_count: usize,
    pub runs: Vec<String>,
    /// The run whose report was missing; absent when all letters were used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    pub summary_rows: usize,
    pub rows_skipped: u64,
    pub bytes_fetched: u64,
    pub columns: Vec<ColumnJson>,
    pub artifacts: Vec<PathBuf>,
}

/// Parameters of an invocation that are not part of its result
#[derive(Debug, Clone)]
pub struct InvocationInfo {
    pub invocation_id: String,
    pub created_at: String,
    pub source: SourceJson,
    pub layout: String,
    pub skip_count: usize,
}

impl InvocationManifest {
    pub fn new(
        info: InvocationInfo,
        summary: &SummaryTable,
        stats: &IngestStats,
        artifacts: Vec<PathBuf>,
    ) -> Self {
        Self {
            invocation_id: info.invocation_id,
            created_at: info.created_at,
            program_id: summary.program_id().to_string(),
            source: info.source,
            layout: info.layout,
            skip_count: info.skip_count,
            runs: summary.runs().iter().map(|r| r.to_string()).collect(),
            stopped_at: stats.stopped_at.map(|r| r.to_string()),
            summary_rows: summary.num_rows(),
            rows_skipped: stats.rows_skipped,
            bytes_fetched: stats.bytes_fetched,
            columns: ColumnJson::from_table(summary.table()),
            artifacts,
        }
    }
}
