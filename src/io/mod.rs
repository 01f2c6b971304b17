//! Run report sources: the portal session and saved reports

pub mod fetcher;
pub mod local;
pub mod portal;
pub mod uri;

pub use fetcher::{FetchOutcome, RunBlock, RunFetcher};
pub use local::LocalFetcher;
pub use portal::PortalFetcher;
pub use uri::ReportSource;
