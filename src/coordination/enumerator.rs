use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RUN_ALPHABET;
use crate::error::{PipelineError, TransportError};
use crate::io::{FetchOutcome, RunBlock, RunFetcher};

/// Letter of one run of an observing programme, `A` to `Z`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid run letter '{0}', expected A to Z")]
pub struct InvalidRunId(pub char);

impl RunId {
    pub const FIRST: RunId = RunId(RUN_ALPHABET.as_bytes()[0]);

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// The following run letter, `None` after the last one
    pub fn next(self) -> Option<RunId> {
        let alphabet = RUN_ALPHABET.as_bytes();
        let pos = alphabet.iter().position(|&b| b == self.0)?;
        alphabet.get(pos + 1).map(|&b| RunId(b))
    }

    /// Resource name of this run's report
    pub fn resource(self, program_id: &str) -> String {
        format!("{}{}", program_id, self)
    }
}

impl TryFrom<char> for RunId {
    type Error = InvalidRunId;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        if c.is_ascii() && RUN_ALPHABET.as_bytes().contains(&(c as u8)) {
            Ok(RunId(c as u8))
        } else {
            Err(InvalidRunId(c))
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Where the enumerator stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorState {
    /// The next fetch asks for this run
    Pending(RunId),
    /// A report was missing, or the last run letter was fetched
    Exhausted,
    /// A fetch failed; nothing more is fetched
    Aborted,
}

/// Lazily fetches run reports in alphabet order
///
/// The first missing report ends the sequence: no later run is ever asked
/// for. Once exhausted or aborted, further calls return `None` without
/// fetching until [`RunEnumerator::restart`].
pub struct RunEnumerator {
    fetcher: Arc<dyn RunFetcher>,
    program_id: String,
    fetch_timeout: Duration,
    state: EnumeratorState,
    stopped_at: Option<RunId>,
}

impl RunEnumerator {
    pub fn new(
        fetcher: Arc<dyn RunFetcher>,
        program_id: impl Into<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            program_id: program_id.into(),
            fetch_timeout,
            state: EnumeratorState::Pending(RunId::FIRST),
            stopped_at: None,
        }
    }

    pub fn state(&self) -> EnumeratorState {
        self.state
    }

    /// The run the next call will fetch
    pub fn pending(&self) -> Option<RunId> {
        match self.state {
            EnumeratorState::Pending(run) => Some(run),
            _ => None,
        }
    }

    /// The run whose report was missing, once the sequence ended that way
    pub fn stopped_at(&self) -> Option<RunId> {
        self.stopped_at
    }

    pub fn restart(&mut self) {
        self.state = EnumeratorState::Pending(RunId::FIRST);
        self.stopped_at = None;
    }

    /// Fetch the next run report
    ///
    /// Returns `Ok(None)` when the sequence has ended. A transport failure or
    /// a fetch exceeding the timeout aborts the enumerator.
    pub async fn next_block(&mut self) -> Result<Option<RunBlock>, PipelineError> {
        let EnumeratorState::Pending(run) = self.state else {
            return Ok(None);
        };

        let resource = run.resource(&self.program_id);
        debug!("Fetching {} from {}", resource, self.fetcher.describe());

        let fetch = self.fetcher.fetch(&resource);
        let outcome = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(source)) => {
                self.state = EnumeratorState::Aborted;
                return Err(PipelineError::Transport { resource, source });
            }
            Err(_) => {
                self.state = EnumeratorState::Aborted;
                return Err(PipelineError::Transport {
                    resource,
                    source: TransportError::Timeout(self.fetch_timeout),
                });
            }
        };

        match outcome {
            FetchOutcome::Found(body) => {
                self.state = match run.next() {
                    Some(next) => EnumeratorState::Pending(next),
                    None => {
                        info!("Run {} is the last run letter", run);
                        EnumeratorState::Exhausted
                    }
                };
                Ok(Some(RunBlock::new(run, resource, body)))
            }
            FetchOutcome::NotFound => {
                info!("{} not found, run sequence ends", resource);
                self.state = EnumeratorState::Exhausted;
                self.stopped_at = Some(run);
                Ok(None)
            }
        }
    }
}
