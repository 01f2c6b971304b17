//! Error taxonomy of the ingestion pipeline
//!
//! "Resource not found" is deliberately absent: it is the expected end of the
//! run sequence and travels as `FetchOutcome::NotFound`.

use std::time::Duration;
use thiserror::Error;

use crate::coordination::{PartialSummary, RunId};

/// Failure of the fetcher itself (network, HTTP status, login, I/O)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("portal login failed: {0}")]
    Login(String),

    #[error("fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A block that does not follow the preamble/header/rows layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("run {run}: block has {lines} line(s), expected at least {expected}")]
    Truncated {
        run: RunId,
        lines: usize,
        expected: usize,
    },

    #[error("run {run}: header line {line} is empty")]
    EmptyHeader { run: RunId, line: usize },

    #[error("run {run}: line {line} has {found} field(s), header has {expected}")]
    FieldCount {
        run: RunId,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("run {run}: line {line} could not be tokenized: {message}")]
    Tokenize {
        run: RunId,
        line: usize,
        message: String,
    },
}

impl ParseError {
    pub fn run(&self) -> RunId {
        match self {
            ParseError::Truncated { run, .. }
            | ParseError::EmptyHeader { run, .. }
            | ParseError::FieldCount { run, .. }
            | ParseError::Tokenize { run, .. } => *run,
        }
    }

    /// 0-based line index within the block, if the error points at one line
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Truncated { .. } => None,
            ParseError::EmptyHeader { line, .. }
            | ParseError::FieldCount { line, .. }
            | ParseError::Tokenize { line, .. } => Some(*line),
        }
    }
}

/// A later run whose columns do not match the first run's columns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("run {offending} columns {found:?} do not match run {first} columns {expected:?}")]
pub struct MergeError {
    pub first: RunId,
    pub offending: RunId,
    pub expected: Vec<String>,
    pub found: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch {resource}")]
    Transport {
        resource: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("no runs found for programme {program_id}: the first run report does not exist")]
    EmptyResult { program_id: String },

    #[error("cancelled before run {before}")]
    Cancelled { before: RunId },

    #[error("failed to write {logical_name}")]
    Sink {
        logical_name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A pipeline that stopped on an unexpected condition
///
/// The partial summary holds every run merged before the failure. It is kept
/// for diagnostics and is never a complete summary.
#[derive(Debug, Error)]
#[error("ingestion aborted")]
pub struct Aborted {
    #[source]
    pub error: PipelineError,
    pub partial: Option<PartialSummary>,
}

impl Aborted {
    pub fn new(error: PipelineError, partial: Option<PartialSummary>) -> Self {
        Self { error, partial }
    }
}
