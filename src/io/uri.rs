use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

/// Where run reports are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    /// Report directory on the portal; reports are `<resource>.csv` below it
    Portal(Url),
    /// Directory of saved raw reports
    Local(PathBuf),
}

impl ReportSource {
    /// Parse a URL or path. `http(s)://` is the portal, `file://` and plain
    /// paths are local directories.
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "http" | "https" => Ok(ReportSource::Portal(directory_url(url))),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(ReportSource::Local(path))
                }
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local directory
            Ok(ReportSource::Local(PathBuf::from(uri)))
        }
    }
}

/// A base URL whose path ends in `/`, so joining keeps the last segment
fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// URL of one run report below the report directory
pub fn report_url(base: &Url, resource: &str) -> Result<Url, url::ParseError> {
    directory_url(base.clone()).join(&format!("{}.csv", resource))
}

/// Single-sign-on login URL carrying the service to return to
pub fn login_url(login: &str, service: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(login, &[("service", service)])
}

/// File name of a saved report
pub fn report_file_name(resource: &str) -> String {
    format!("{}.csv", resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_portal_url() {
        let source = ReportSource::parse("http://www.eso.org/observing/usg/status_pl/csv").unwrap();
        match source {
            ReportSource::Portal(url) => {
                assert_eq!(url.as_str(), "http://www.eso.org/observing/usg/status_pl/csv/");
            }
            _ => panic!("Expected portal URL"),
        }
    }

    #[test]
    fn test_parse_local_path() {
        let source = ReportSource::parse("/data/vhs/20120328/raw").unwrap();
        assert_eq!(source, ReportSource::Local(PathBuf::from("/data/vhs/20120328/raw")));
    }

    #[test]
    fn test_parse_relative_path() {
        let source = ReportSource::parse("out/raw").unwrap();
        assert!(matches!(source, ReportSource::Local(_)));
    }

    #[test]
    fn test_parse_file_uri() {
        let source = ReportSource::parse("file:///data/raw").unwrap();
        assert_eq!(source, ReportSource::Local(PathBuf::from("/data/raw")));
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(ReportSource::parse("s3://bucket/raw").is_err());
    }

    #[test]
    fn test_report_url_keeps_base_path() {
        let base = Url::parse("http://www.eso.org/observing/usg/status_pl/csv").unwrap();
        let url = report_url(&base, "179A2010C").unwrap();
        assert_eq!(
            url.as_str(),
            "http://www.eso.org/observing/usg/status_pl/csv/179A2010C.csv"
        );
    }

    #[test]
    fn test_login_url_encodes_service() {
        let url = login_url(
            "https://www.eso.org/sso/login",
            "https://www.eso.org:443/UserPortal/security_check",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.eso.org/sso/login?service=https%3A%2F%2Fwww.eso.org%3A443%2FUserPortal%2Fsecurity_check"
        );
    }
}
