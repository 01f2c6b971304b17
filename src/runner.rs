//! High-level runner API for the survey progress fetcher.
//!
//! This module wires the settings file, a report source, the output sink, the
//! ingestion pipeline and the reports drawn from the finished summary.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Settings;
use crate::coordination::manifest::{InvocationInfo, InvocationManifest, SourceJson};
use crate::coordination::{CancelFlag, Pipeline, PipelineConfigBuilder, SummaryTable};
use crate::formats::FieldLayout;
use crate::io::{LocalFetcher, PortalFetcher, ReportSource, RunFetcher};
use crate::report::{PlotOptionsBuilder, column_value_counts, scatter_columns};
use crate::sink::{LocalSink, TableSink};
use crate::telemetry::IngestStats;

/// Where the run reports of an invocation are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Download the reports. `base_url` overrides `portal.report_base_url`
    /// and may also name a local directory.
    Fetch { base_url: Option<String> },
    /// Rebuild the summary from reports saved by an earlier fetch. Defaults
    /// to the raw directory of the invocation date.
    Replay { from: Option<PathBuf> },
}

/// Arguments for one ingestion
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub settings: Settings,
    pub mode: SourceMode,

    // Overrides of the settings file
    pub program_id: Option<String>,
    pub output_root: Option<PathBuf>,
    pub skip_count: Option<usize>,

    /// Names the dated output directory
    pub date: NaiveDate,

    // Reports on the summary
    pub count_columns: Vec<String>,
    /// (x, y) column pairs
    pub plots: Vec<(String, String)>,

    pub quiet: bool,
    pub cancel: CancelFlag,
}

impl IngestArgs {
    pub fn new(settings: Settings, mode: SourceMode) -> Self {
        Self {
            settings,
            mode,
            program_id: None,
            output_root: None,
            skip_count: None,
            date: Utc::now().date_naive(),
            count_columns: Vec::new(),
            plots: Vec::new(),
            quiet: false,
            cancel: CancelFlag::new(),
        }
    }
}

/// Result of a completed ingestion
#[derive(Debug)]
pub struct IngestResult {
    pub invocation_id: String,
    pub summary: SummaryTable,
    pub stats: IngestStats,
    pub output_dir: PathBuf,
    /// Every file written: raw reports, tables and the manifest
    pub artifacts: Vec<PathBuf>,
    pub manifest_path: PathBuf,
    pub counts: IndexMap<String, IndexMap<String, usize>>,
    pub plots: Vec<PathBuf>,
    pub duration: Duration,
}

/// Run one ingestion with the specified arguments
///
/// This is the main entry point. It handles:
/// - Logging in to the portal, or opening a directory of saved reports
/// - Fetching, parsing and merging every run of the programme
/// - Writing per-run tables, the summary and the invocation manifest
/// - Value counts and scatter plots of the summary
///
/// # Example
///
/// ```no_run
/// use survey_progress::config::Settings;
/// use survey_progress::runner::{IngestArgs, SourceMode, run_ingest};
///
/// # async fn example() -> anyhow::Result<()> {
/// let settings = Settings::load("progress.toml".as_ref())?;
/// let mut args = IngestArgs::new(settings, SourceMode::Fetch { base_url: None });
/// args.count_columns = vec!["status".to_string()];
/// args.plots = vec![("ra".to_string(), "dec".to_string())];
///
/// let result = run_ingest(args).await?;
/// println!("Merged {} rows in {:?}", result.summary.num_rows(), result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(args: IngestArgs) -> Result<IngestResult> {
    let program_id = args
        .program_id
        .clone()
        .unwrap_or_else(|| args.settings.program.id.clone());
    let output_root = args
        .output_root
        .clone()
        .unwrap_or_else(|| args.settings.program.output_root.clone());
    let skip_count = args.skip_count.unwrap_or_else(|| args.settings.skip_count());
    let layout = FieldLayout::from(args.settings.program.layout);

    let sink = Arc::new(LocalSink::new(&output_root, args.date));

    let (fetcher, source, persist_raw) = open_source(&args, &sink).await?;

    let config = PipelineConfigBuilder::default()
        .program_id(program_id.clone())
        .skip_count(skip_count)
        .layout(layout)
        .persist_raw(persist_raw)
        .quiet(args.quiet)
        .build()?;

    let pipeline = Pipeline::new(
        config,
        fetcher,
        Arc::clone(&sink) as Arc<dyn TableSink>,
        args.cancel.clone(),
    );
    let run = pipeline.run_tracked().await;

    let summary = match run.outcome {
        Ok(summary) => summary,
        Err(aborted) => {
            let partial = match &aborted.partial {
                Some(partial) => format!(
                    "{} rows of runs {} were merged before the failure",
                    partial.num_rows(),
                    partial
                        .runs()
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                None => "nothing was merged".to_string(),
            };
            return Err(anyhow::Error::new(aborted)
                .context(format!("Ingestion of programme {} failed; {}", program_id, partial)));
        }
    };

    let invocation_id = uuid::Uuid::new_v4().to_string();
    let mut artifacts = run.artifacts;
    let manifest = InvocationManifest::new(
        InvocationInfo {
            invocation_id: invocation_id.clone(),
            created_at: Utc::now().to_rfc3339(),
            source,
            layout: layout.describe(),
            skip_count,
        },
        &summary,
        &run.stats,
        artifacts.clone(),
    );
    let manifest_path = sink
        .write_manifest(&manifest)
        .await
        .context("Failed to write invocation manifest")?;
    artifacts.push(manifest_path.clone());

    let mut counts = IndexMap::new();
    for column in &args.count_columns {
        let column_counts = column_value_counts(summary.table(), column)
            .with_context(|| format!("Cannot count values of column '{}'", column))?;
        counts.insert(column.clone(), column_counts);
    }

    let mut plots = Vec::new();
    for (x, y) in &args.plots {
        let options = PlotOptionsBuilder::default()
            .output(sink.dir().join(format!("{}_{}_{}.svg", program_id, x, y)))
            .title(format!("{}: {} vs {}", program_id, y, x))
            .x_label(x.as_str())
            .y_label(y.as_str())
            .build()?;
        let path = scatter_columns(summary.table(), x, y, &options)
            .with_context(|| format!("Cannot plot {} against {}", y, x))?;
        plots.push(path);
    }

    info!(
        "Invocation {} wrote {} files to {}",
        invocation_id,
        artifacts.len() + plots.len(),
        sink.dir().display()
    );

    Ok(IngestResult {
        invocation_id,
        summary,
        stats: run.stats,
        output_dir: sink.dir().to_path_buf(),
        artifacts,
        manifest_path,
        counts,
        plots,
        duration: run.duration,
    })
}

/// Build the fetcher for the requested mode
async fn open_source(
    args: &IngestArgs,
    sink: &LocalSink,
) -> Result<(Arc<dyn RunFetcher>, SourceJson, bool)> {
    match &args.mode {
        SourceMode::Fetch { base_url } => {
            let base = match (base_url, &args.settings.portal) {
                (Some(base), _) => base.clone(),
                (None, Some(portal)) => portal.report_base_url.clone(),
                (None, None) => {
                    return Err(anyhow!(
                        "Fetching needs a [portal] section in the settings file or --base-url"
                    ));
                }
            };

            match ReportSource::parse(&base)? {
                ReportSource::Portal(url) => {
                    let portal = args.settings.portal.as_ref().ok_or_else(|| {
                        anyhow!("Fetching from {} needs portal credentials in the settings file", url)
                    })?;
                    let fetcher = PortalFetcher::login(portal, url.clone())
                        .await
                        .context("Portal login failed")?;
                    Ok((
                        Arc::new(fetcher),
                        SourceJson::Portal {
                            url: url.to_string(),
                        },
                        true,
                    ))
                }
                ReportSource::Local(dir) => Ok((
                    Arc::new(LocalFetcher::new(&dir)),
                    SourceJson::Replay { dir },
                    true,
                )),
            }
        }
        SourceMode::Replay { from } => {
            let dir = from.clone().unwrap_or_else(|| sink.raw_dir());
            if !dir.is_dir() {
                return Err(anyhow!(
                    "No saved reports to replay: {} is not a directory",
                    dir.display()
                ));
            }
            // Saved reports stay where they are when replaying the date's own raw directory
            let persist_raw = dir != sink.raw_dir();
            Ok((
                Arc::new(LocalFetcher::new(&dir)),
                SourceJson::Replay { dir },
                persist_raw,
            ))
        }
    }
}
