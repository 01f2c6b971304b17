use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::accumulator::{MergeAccumulator, SummaryTable};
use super::enumerator::RunEnumerator;
use crate::config::{DEFAULT_SKIP_COUNT, FETCH_TIMEOUT};
use crate::error::{Aborted, PipelineError};
use crate::formats::delimited::{BlockParser, FieldLayout};
use crate::formats::table::Table;
use crate::io::{RunBlock, RunFetcher};
use crate::sink::{TableFormat, TableSink};
use crate::telemetry::{IngestStats, RunEvent};

/// Configuration of one ingestion
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct PipelineConfig {
    pub program_id: String,
    #[builder(default = "DEFAULT_SKIP_COUNT")]
    pub skip_count: usize,
    #[builder(default)]
    pub layout: FieldLayout,
    #[builder(default = "FETCH_TIMEOUT")]
    pub fetch_timeout: Duration,
    /// Store every fetched report verbatim; off when replaying saved reports
    #[builder(default = "true")]
    pub persist_raw: bool,
    #[builder(default)]
    pub quiet: bool,
}

/// Shared flag a caller sets to stop the pipeline before its next run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a pipeline run together with what it wrote
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: Result<SummaryTable, Aborted>,
    pub stats: IngestStats,
    pub artifacts: Vec<PathBuf>,
    pub duration: Duration,
}

/// Drives fetch, parse, persist and merge for every run of a programme
///
/// Runs are processed strictly one after another. The accumulator is owned
/// by the running future; an abort hands back what was merged so far.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn RunFetcher>,
    sink: Arc<dyn TableSink>,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn RunFetcher>,
        sink: Arc<dyn TableSink>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            fetcher,
            sink,
            cancel,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<SummaryTable, Aborted> {
        self.run_tracked().await.outcome
    }

    /// Run the complete ingestion
    ///
    /// 1. Fetch runs A, B, ... until one is missing
    /// 2. Persist each raw report and its parsed table
    /// 3. Merge each table into the summary
    /// 4. Persist the summary
    pub async fn run_tracked(&self) -> PipelineRun {
        let start_time = Instant::now();
        info!(
            "Starting ingestion of programme {} from {} (skip_count {}, layout {})",
            self.config.program_id,
            self.fetcher.describe(),
            self.config.skip_count,
            self.config.layout.describe()
        );

        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<RunEvent>();
        let progress = Self::setup_progress_tracking(self.config.quiet, telemetry_rx);

        let mut artifacts = Vec::new();
        let outcome = self.ingest(&telemetry_tx, &mut artifacts).await;

        // Close the channel so the progress task drains and returns
        drop(telemetry_tx);
        let stats = match progress.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Progress tracking task failed: {:#}", e);
                IngestStats::default()
            }
        };

        let duration = start_time.elapsed();
        match &outcome {
            Ok(summary) => info!(
                "Ingestion complete: {} runs, {} rows in {:.2}s",
                summary.runs().len(),
                summary.num_rows(),
                duration.as_secs_f64()
            ),
            Err(aborted) => warn!("Ingestion aborted: {}", aborted.error),
        }

        PipelineRun {
            outcome,
            stats,
            artifacts,
            duration,
        }
    }

    async fn ingest(
        &self,
        telemetry_tx: &mpsc::UnboundedSender<RunEvent>,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<SummaryTable, Aborted> {
        let parser = BlockParser::new(self.config.layout);
        let mut enumerator = RunEnumerator::new(
            Arc::clone(&self.fetcher),
            self.config.program_id.clone(),
            self.config.fetch_timeout,
        );
        let mut accumulator = MergeAccumulator::new(&self.config.program_id, self.config.skip_count);

        while let Some(next) = enumerator.pending() {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested before run {}", next);
                return Err(Aborted::new(
                    PipelineError::Cancelled { before: next },
                    accumulator.into_partial(),
                ));
            }

            let fetch_start = Instant::now();
            let block = match enumerator.next_block().await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    if let Some(run) = enumerator.stopped_at() {
                        let _ = telemetry_tx.send(RunEvent::NotFound { run });
                    }
                    break;
                }
                Err(e) => return Err(Aborted::new(e, accumulator.into_partial())),
            };
            let _ = telemetry_tx.send(RunEvent::Fetched {
                run: block.run(),
                bytes: block.byte_len() as u64,
                duration_ms: fetch_start.elapsed().as_millis() as u64,
            });

            if let Err(e) = self.persist_block(&block, artifacts).await {
                return Err(Aborted::new(e, accumulator.into_partial()));
            }

            let parsed = match parser.parse(&block) {
                Ok(parsed) => parsed,
                Err(e) => return Err(Aborted::new(e.into(), accumulator.into_partial())),
            };

            for format in TableFormat::ALL {
                if let Err(e) = self
                    .persist_table(parsed.table(), block.resource(), format, artifacts)
                    .await
                {
                    return Err(Aborted::new(e, accumulator.into_partial()));
                }
            }

            let run = parsed.run();
            let step = match accumulator.push(parsed) {
                Ok(step) => step,
                Err(e) => return Err(Aborted::new(e.into(), accumulator.into_partial())),
            };
            let _ = telemetry_tx.send(RunEvent::Merged {
                run,
                rows_kept: step.rows_kept as u64,
                rows_skipped: step.rows_skipped as u64,
            });
        }

        let summary = accumulator
            .finish()
            .map_err(|e| Aborted::new(e, None))?;

        for format in TableFormat::ALL {
            let written = self
                .persist_table(summary.table(), &self.config.program_id, format, artifacts)
                .await;
            if let Err(e) = written {
                return Err(Aborted::new(e, Some(summary.into_partial())));
            }
        }

        Ok(summary)
    }

    async fn persist_block(
        &self,
        block: &RunBlock,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError> {
        if !self.config.persist_raw {
            return Ok(());
        }
        let path = self
            .sink
            .write_raw(block)
            .await
            .map_err(|source| PipelineError::Sink {
                logical_name: format!("raw {}", block.resource()),
                source,
            })?;
        artifacts.push(path);
        Ok(())
    }

    async fn persist_table(
        &self,
        table: &Table,
        logical_name: &str,
        format: TableFormat,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError> {
        let path = self
            .sink
            .write_table(table, logical_name, format)
            .await
            .map_err(|source| PipelineError::Sink {
                logical_name: format!("{}.{}", logical_name, format.extension()),
                source,
            })?;
        artifacts.push(path);
        Ok(())
    }

    /// Spinner fed by run events; the task returns the final statistics
    fn setup_progress_tracking(
        quiet: bool,
        mut telemetry_rx: mpsc::UnboundedReceiver<RunEvent>,
    ) -> tokio::task::JoinHandle<IngestStats> {
        let spinner = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("[{elapsed_precise}] {spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };

        tokio::spawn(async move {
            let mut stats = IngestStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);

                let message = match &event {
                    RunEvent::Fetched { run, .. } => format!("Fetched run {}", run),
                    RunEvent::Merged { run, .. } => format!(
                        "Merged run {} | {} rows | {} bytes",
                        run, stats.rows_kept, stats.bytes_fetched
                    ),
                    RunEvent::NotFound { run } => format!("Run {} not found", run),
                };
                spinner.set_message(message);
            }

            let (p50, p90, p99) = stats.get_percentiles();
            if let (Some(p50), Some(p90), Some(p99)) = (p50, p90, p99) {
                spinner.finish_with_message(format!(
                    "{} runs, {} rows | fetch p50: {}ms, p90: {}ms, p99: {}ms",
                    stats.runs_merged, stats.rows_kept, p50, p90, p99
                ));
            } else {
                spinner.finish_and_clear();
            }

            stats
        })
    }
}
