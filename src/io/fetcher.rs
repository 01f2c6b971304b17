use async_trait::async_trait;

use crate::coordination::RunId;
use crate::error::TransportError;

/// Result of asking a fetcher for one run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The report body as received
    Found(String),
    /// The report does not exist; this ends the run sequence
    NotFound,
}

/// Source of run reports (portal session, saved files, ...)
///
/// A missing report is `Ok(FetchOutcome::NotFound)`. Everything else that
/// goes wrong is a `TransportError`.
#[async_trait]
pub trait RunFetcher: Send + Sync {
    async fn fetch(&self, resource: &str) -> Result<FetchOutcome, TransportError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// The report fetched for one run, kept both verbatim and split into lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunBlock {
    run: RunId,
    resource: String,
    body: String,
    lines: Vec<String>,
}

impl RunBlock {
    pub fn new(run: RunId, resource: String, body: String) -> Self {
        let lines = split_lines(&body);
        Self {
            run,
            resource,
            body,
            lines,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Resource name, `<program_id><run>`
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines with a trailing `\r` removed and trailing blank lines dropped
    pub fn significant_lines(&self) -> Vec<&str> {
        let mut lines: Vec<&str> = self
            .lines
            .iter()
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        lines
    }

    /// The body exactly as fetched, line endings included
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn byte_len(&self) -> usize {
        self.body.len()
    }
}

/// Split a fetched body into lines; handles both `\n` and `\r\n`
pub fn split_lines(body: &str) -> Vec<String> {
    body.lines().map(str::to_string).collect()
}
