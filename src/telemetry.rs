use crate::coordination::RunId;

/// Telemetry events emitted by the pipeline driver for progress tracking
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A run report was fetched
    Fetched {
        run: RunId,
        bytes: u64,
        duration_ms: u64,
    },
    /// A parsed run table was merged into the summary
    Merged {
        run: RunId,
        rows_kept: u64,
        rows_skipped: u64,
    },
    /// The fetcher reported the run does not exist
    NotFound { run: RunId },
}

/// Statistics aggregated from run events
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub runs_fetched: usize,
    pub runs_merged: usize,
    pub rows_kept: u64,
    pub rows_skipped: u64,
    pub bytes_fetched: u64,
    pub fetch_durations_ms: Vec<u64>,
    /// The run that ended the sequence, if it ended on a missing report
    pub stopped_at: Option<RunId>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a run event
    pub fn update(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Fetched {
                bytes, duration_ms, ..
            } => {
                self.runs_fetched += 1;
                self.bytes_fetched += bytes;
                self.fetch_durations_ms.push(*duration_ms);
            }
            RunEvent::Merged {
                rows_kept,
                rows_skipped,
                ..
            } => {
                self.runs_merged += 1;
                self.rows_kept += rows_kept;
                self.rows_skipped += rows_skipped;
            }
            RunEvent::NotFound { run } => {
                self.stopped_at = Some(*run);
            }
        }
    }

    /// Calculate percentile from fetch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.fetch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.fetch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
