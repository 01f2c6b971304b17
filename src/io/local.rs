use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::fetcher::{FetchOutcome, RunFetcher};
use super::uri::report_file_name;
use crate::error::TransportError;

/// Replays run reports saved by an earlier fetch
///
/// Reports are read from `<dir>/<resource>.csv`; a missing file ends the
/// run sequence like a missing report on the portal.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, resource: &str) -> PathBuf {
        self.dir.join(report_file_name(resource))
    }
}

#[async_trait]
impl RunFetcher for LocalFetcher {
    async fn fetch(&self, resource: &str) -> Result<FetchOutcome, TransportError> {
        let path = self.path_for(resource);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(FetchOutcome::Found(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist", path.display());
                Ok(FetchOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("saved reports in {}", self.dir.display())
    }
}
