//! Run enumeration, merging and the pipeline driver

pub mod accumulator;
pub mod coordinator;
pub mod enumerator;
pub mod manifest;

pub use accumulator::{MergeAccumulator, MergeStep, PartialSummary, SummaryTable, fold};
pub use coordinator::{CancelFlag, Pipeline, PipelineConfig, PipelineConfigBuilder, PipelineRun};
pub use enumerator::{EnumeratorState, InvalidRunId, RunEnumerator, RunId};
