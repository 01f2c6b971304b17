//! Configuration constants and the settings file for the progress fetcher
//!
//! This module centralizes the tunable parameters used throughout the
//! application and loads the per-programme settings file that carries the
//! portal credentials.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Run Enumeration
// ============================================================================

/// Run letters are drawn from this alphabet, in order
pub const RUN_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Lines at the top of every fetched block that are not data: the free-text
/// preamble and the column header line
pub const PREAMBLE_LINES: usize = 2;

/// Rows dropped from the start of every non-first block during merge
///
/// Each report repeats one labelling row below its header. Older versions of
/// the download script dropped two rows instead, so this is configurable.
pub const DEFAULT_SKIP_COUNT: usize = 1;

// ============================================================================
// Portal Configuration
// ============================================================================

pub const DEFAULT_LOGIN_URL: &str = "https://www.eso.org/sso/login";

pub const DEFAULT_SERVICE_URL: &str = "https://www.eso.org:443/UserPortal/security_check";

pub const DEFAULT_REPORT_BASE_URL: &str = "http://www.eso.org/observing/usg/status_pl/csv/";

/// Text the login response contains when the single-sign-on succeeded
pub const LOGIN_SUCCESS_MARKER: &str = "Log In Successful";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for one HTTP attempt; a slower attempt is retried
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for one report fetch, including internal retries
///
/// A fetch that exceeds this is an unexpected failure, never the end of the
/// run sequence.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub const MAX_RETRIES: u32 = 3;

pub const USER_AGENT: &str = concat!("survey-progress/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Output Configuration
// ============================================================================

pub const DEFAULT_CONFIG_FILE: &str = "progress.toml";

/// Sub directory of the dated output directory holding the raw fetched blocks
pub const RAW_SUBDIR: &str = "raw";

/// Date format of the per-invocation output directory
pub const DATE_DIR_FORMAT: &str = "%Y%m%d";

// ============================================================================
// Settings File
// ============================================================================

/// Field layout of the report lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
    #[default]
    Csv,
    Tsv,
    Whitespace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramSettings {
    pub id: String,
    pub output_root: PathBuf,
    #[serde(default)]
    pub skip_count: Option<usize>,
    #[serde(default)]
    pub layout: LayoutName,
}

/// Portal login. Never inspected by the pipeline, only handed to the session.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSettings {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_report_base_url")]
    pub report_base_url: String,
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_report_base_url() -> String {
    DEFAULT_REPORT_BASE_URL.to_string()
}

/// Contents of the settings file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub program: ProgramSettings,
    /// Only needed when fetching from the portal
    #[serde(default)]
    pub portal: Option<PortalSettings>,
}

impl Settings {
    /// Load the settings file, refusing files other users can read
    pub fn load(path: &Path) -> Result<Self> {
        check_private(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        if settings.program.id.trim().is_empty() {
            bail!("program.id must not be empty");
        }
        Ok(settings)
    }

    pub fn skip_count(&self) -> usize {
        self.program.skip_count.unwrap_or(DEFAULT_SKIP_COUNT)
    }
}

/// The settings file holds a password: reject it when group or other have
/// any access
#[cfg(unix)]
fn check_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat settings file {}", path.display()))?;
    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        bail!(
            "Settings file {} has mode {:o}; it holds credentials, run\n    chmod go-rw {}",
            path.display(),
            mode & 0o777,
            path.display()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_private(_path: &Path) -> Result<()> {
    Ok(())
}
