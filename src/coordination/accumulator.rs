use tracing::debug;

use super::enumerator::RunId;
use crate::error::{MergeError, PipelineError};
use crate::formats::table::{ParsedTable, Table, TableBuilder};

/// The merged table of every run of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    program_id: String,
    runs: Vec<RunId>,
    table: Table,
}

impl SummaryTable {
    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    /// Merged runs, in merge order
    pub fn runs(&self) -> &[RunId] {
        &self.runs
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Demote a summary whose invocation failed after the merge
    pub fn into_partial(self) -> PartialSummary {
        PartialSummary {
            program_id: self.program_id,
            runs: self.runs,
            table: self.table,
        }
    }
}

/// What an aborted invocation had merged before it stopped
///
/// Deliberately not a [`SummaryTable`]: it never feeds reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSummary {
    program_id: String,
    runs: Vec<RunId>,
    table: Table,
}

impl PartialSummary {
    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    pub fn runs(&self) -> &[RunId] {
        &self.runs
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }
}

/// Row accounting of one merged run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStep {
    pub rows_kept: usize,
    pub rows_skipped: usize,
}

enum State {
    Empty,
    Partial {
        runs: Vec<RunId>,
        builder: TableBuilder,
    },
}

/// Folds per-run tables into one summary
///
/// The first table is kept whole. Every later table loses its first
/// `skip_count` rows (all of them when it has fewer) and must carry exactly
/// the first table's column names in the same order.
pub struct MergeAccumulator {
    program_id: String,
    skip_count: usize,
    state: State,
}

impl MergeAccumulator {
    pub fn new(program_id: impl Into<String>, skip_count: usize) -> Self {
        Self {
            program_id: program_id.into(),
            skip_count,
            state: State::Empty,
        }
    }

    pub fn skip_count(&self) -> usize {
        self.skip_count
    }

    pub fn runs(&self) -> &[RunId] {
        match &self.state {
            State::Empty => &[],
            State::Partial { runs, .. } => runs,
        }
    }

    pub fn num_rows(&self) -> usize {
        match &self.state {
            State::Empty => 0,
            State::Partial { builder, .. } => builder.num_rows(),
        }
    }

    /// Merge one run's table. On error the accumulator is left unchanged.
    pub fn push(&mut self, parsed: ParsedTable) -> Result<MergeStep, MergeError> {
        let run = parsed.run();

        match &mut self.state {
            State::Empty => {
                let table = parsed.into_table();
                let rows_kept = table.num_rows();
                debug!("Run {} starts the summary with {} rows", run, rows_kept);
                self.state = State::Partial {
                    runs: vec![run],
                    builder: table.into_builder(),
                };
                Ok(MergeStep {
                    rows_kept,
                    rows_skipped: 0,
                })
            }
            State::Partial { runs, builder } => {
                let table = parsed.table();
                let found = table.column_names();
                if found != builder.names() {
                    return Err(MergeError {
                        first: runs[0],
                        offending: run,
                        expected: builder.names().to_vec(),
                        found: found.into_iter().map(str::to_string).collect(),
                    });
                }

                let rows_kept = builder.extend_from(table, self.skip_count);
                let rows_skipped = table.num_rows() - rows_kept;
                runs.push(run);
                debug!(
                    "Run {} merged: {} rows kept, {} skipped",
                    run, rows_kept, rows_skipped
                );
                Ok(MergeStep {
                    rows_kept,
                    rows_skipped,
                })
            }
        }
    }

    /// Seal the summary. Fails with `EmptyResult` when no run was merged.
    pub fn finish(self) -> Result<SummaryTable, PipelineError> {
        match self.state {
            State::Empty => Err(PipelineError::EmptyResult {
                program_id: self.program_id,
            }),
            State::Partial { runs, builder } => Ok(SummaryTable {
                program_id: self.program_id,
                runs,
                table: builder.finish(),
            }),
        }
    }

    /// The state reached so far, for diagnostics after an abort
    pub fn into_partial(self) -> Option<PartialSummary> {
        match self.state {
            State::Empty => None,
            State::Partial { runs, builder } => Some(PartialSummary {
                program_id: self.program_id,
                runs,
                table: builder.finish(),
            }),
        }
    }
}

/// Merge `tables` in order into one summary
pub fn fold<I>(program_id: &str, skip_count: usize, tables: I) -> Result<SummaryTable, PipelineError>
where
    I: IntoIterator<Item = ParsedTable>,
{
    let mut accumulator = MergeAccumulator::new(program_id, skip_count);
    for table in tables {
        accumulator.push(table)?;
    }
    accumulator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::delimited::BlockParser;
    use crate::formats::schema::ColumnType;
    use crate::io::RunBlock;

    fn parsed(run: char, lines: &[&str]) -> ParsedTable {
        let run = RunId::try_from(run).unwrap();
        let block = RunBlock::new(run, run.resource("P"), lines.join("\n"));
        BlockParser::default().parse(&block).unwrap()
    }

    #[test]
    fn test_first_table_kept_whole_later_tables_skip() {
        let mut acc = MergeAccumulator::new("P", 1);

        let step = acc.push(parsed('A', &["pre", "id,v", "1,a", "2,b"])).unwrap();
        assert_eq!(step, MergeStep { rows_kept: 2, rows_skipped: 0 });

        let step = acc.push(parsed('B', &["pre", "id,v", "label,x", "3,c", "4,d"])).unwrap();
        assert_eq!(step, MergeStep { rows_kept: 2, rows_skipped: 1 });

        let summary = acc.finish().unwrap();
        assert_eq!(summary.num_rows(), 4);
        assert_eq!(summary.runs().len(), 2);
        assert_eq!(summary.table().column_names(), vec!["id", "v"]);

        // The dropped label row does not make the column text
        assert_eq!(summary.table().column("id").unwrap().kind(), ColumnType::Integer);
    }

    #[test]
    fn test_skip_saturates_on_short_tables() {
        let summary = fold(
            "P",
            2,
            vec![
                parsed('A', &["pre", "id", "1"]),
                parsed('B', &["pre", "id", "2"]),
                parsed('C', &["pre", "id"]),
                parsed('D', &["pre", "id", "3", "4", "5"]),
            ],
        )
        .unwrap();

        // 1 + 0 + 0 + (3 - 2)
        assert_eq!(summary.num_rows(), 2);
        assert_eq!(
            summary.table().column("id").unwrap().raw_cells(),
            &["1".to_string(), "5".to_string()][..]
        );
    }

    #[test]
    fn test_zero_skip_keeps_everything() {
        let summary = fold(
            "P",
            0,
            vec![
                parsed('A', &["pre", "id", "1"]),
                parsed('B', &["pre", "id", "2", "3"]),
            ],
        )
        .unwrap();
        assert_eq!(summary.num_rows(), 3);
    }

    #[test]
    fn test_column_mismatch_names_both_runs_and_leaves_state() {
        let mut acc = MergeAccumulator::new("P", 1);
        acc.push(parsed('A', &["pre", "id,v", "1,a"])).unwrap();

        let err = acc
            .push(parsed('B', &["pre", "v,id", "x,y", "b,2"]))
            .unwrap_err();
        assert_eq!(err.first, RunId::try_from('A').unwrap());
        assert_eq!(err.offending, RunId::try_from('B').unwrap());
        assert_eq!(err.expected, vec!["id", "v"]);
        assert_eq!(err.found, vec!["v", "id"]);

        assert_eq!(acc.num_rows(), 1);
        assert_eq!(acc.runs(), &[RunId::try_from('A').unwrap()]);

        // A matching run is still accepted afterwards
        acc.push(parsed('C', &["pre", "id,v", "x,y", "3,c"])).unwrap();
        assert_eq!(acc.num_rows(), 2);
    }

    #[test]
    fn test_finish_without_runs_is_empty_result() {
        let acc = MergeAccumulator::new("179A2010", 1);
        match acc.finish() {
            Err(PipelineError::EmptyResult { program_id }) => assert_eq!(program_id, "179A2010"),
            other => panic!("Expected EmptyResult, got {:?}", other),
        }
        assert!(MergeAccumulator::new("P", 1).into_partial().is_none());
    }

    #[test]
    fn test_into_partial_keeps_merged_rows() {
        let mut acc = MergeAccumulator::new("P", 1);
        acc.push(parsed('A', &["pre", "id", "1", "2"])).unwrap();
        let partial = acc.into_partial().unwrap();
        assert_eq!(partial.num_rows(), 2);
        assert_eq!(partial.runs(), &[RunId::FIRST]);
    }

    #[test]
    fn test_fold_is_repeatable() {
        let blocks = || {
            vec![
                parsed('A', &["pre", "id,v", "1,1.5", "2,"]),
                parsed('B', &["pre", "id,v", "units,deg", "3,2"]),
            ]
        };
        let first = fold("P", 1, blocks()).unwrap();
        let second = fold("P", 1, blocks()).unwrap();
        assert_eq!(first, second);
    }
}
