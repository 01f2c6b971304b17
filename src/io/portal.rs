use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::fetcher::{FetchOutcome, RunFetcher};
use super::uri::{login_url, report_url};
use crate::config::{
    CONNECT_TIMEOUT, Credentials, LOGIN_SUCCESS_MARKER, MAX_RETRIES, PortalSettings,
    REQUEST_TIMEOUT, USER_AGENT,
};
use crate::error::TransportError;

/// Hidden login ticket of the single-sign-on form
static LOGIN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input\s+type="hidden"\s+name="lt"\s+value="([^"\s]+)"\s*/?>"#)
        .expect("login token pattern is valid")
});

/// Authenticated session against the observatory user portal
///
/// The session cookie obtained at login is kept by the client, so every
/// report fetch after [`PortalFetcher::login`] is authenticated.
pub struct PortalFetcher {
    client: Client,
    base: Url,
    /// Per attempt; [`get_with_retry`](Self::get_with_retry) retries a slower one
    request_timeout: Duration,
}

impl PortalFetcher {
    /// Log in and return a fetcher for reports below `base`
    pub async fn login(settings: &PortalSettings, base: Url) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let form_url = login_url(&settings.login_url, &settings.service_url)?;

        let page = client
            .get(form_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let token = extract_login_token(&page)
            .ok_or_else(|| TransportError::Login("login page has no lt token".to_string()))?;
        debug!("Obtained login token");

        let response = Self::post_credentials(
            &client,
            &settings.login_url,
            &token,
            &settings.credentials,
            &settings.service_url,
        )
        .await?;

        if !response.contains(LOGIN_SUCCESS_MARKER) {
            return Err(TransportError::Login(format!(
                "portal did not confirm the login for user {}",
                settings.credentials.username
            )));
        }

        info!(
            "Portal login successful for user {}",
            settings.credentials.username
        );
        Ok(Self {
            client,
            base,
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    #[cfg(test)]
    fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Post the login form. The first post after opening the form is known to
    /// fail now and then, so one failed send is retried.
    async fn post_credentials(
        client: &Client,
        url: &str,
        token: &str,
        credentials: &Credentials,
        service: &str,
    ) -> Result<String, TransportError> {
        let form = [
            ("lt", token),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("_eventId", "submit"),
            ("service", service),
        ];

        let response = match client.post(url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Login post failed, retrying once: {}", e);
                client.post(url).form(&form).send().await?
            }
        };

        Ok(response.error_for_status()?.text().await?)
    }

    /// GET with retries for connection failures and timeouts.
    /// HTTP statuses are returned to the caller, never retried.
    async fn get_with_retry(&self, url: &Url) -> Result<reqwest::Response, TransportError> {
        for attempt in 0..MAX_RETRIES {
            let request = self.client.get(url.clone()).timeout(self.request_timeout);
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES - 1 => {
                    let delay_ms = 100 * 2u64.pow(attempt);
                    warn!(
                        "Fetching {} failed (attempt {}), retrying in {}ms: {}",
                        url,
                        attempt + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        unreachable!("Retry loop should always return");
    }
}

#[async_trait]
impl RunFetcher for PortalFetcher {
    async fn fetch(&self, resource: &str) -> Result<FetchOutcome, TransportError> {
        let url = report_url(&self.base, resource)?;

        let response = self.get_with_retry(&url).await?;
        let status = response.status();

        if is_not_found(status) {
            debug!("{} answered {}", url, status);
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(FetchOutcome::Found(body))
    }

    fn describe(&self) -> String {
        format!("portal {}", self.base)
    }
}

pub(crate) fn extract_login_token(page: &str) -> Option<String> {
    LOGIN_TOKEN
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Statuses that mean the run report does not exist
pub(crate) fn is_not_found(status: StatusCode) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE)
}

fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const LOGIN_FORM: &str = r#"<form method="post">
        <input type="hidden" name="lt" value="LT-42-stub" />
        </form>"#;

    /// What the stub portal does with one request
    enum Reply {
        Send(String),
        /// Close the connection without answering
        Hangup,
        /// Keep the connection open without answering
        Stall,
    }

    #[derive(Debug, Clone)]
    struct Request {
        method: String,
        /// Path and query
        target: String,
        body: String,
    }

    impl Request {
        fn path(&self) -> &str {
            self.target.split('?').next().unwrap_or_default()
        }
    }

    /// HTTP/1.1 portal on a loopback port. The handler gets the method, the
    /// path and how many earlier requests had the same method and path.
    struct StubPortal {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<Request>>>,
    }

    impl StubPortal {
        async fn start<H>(handler: H) -> Self
        where
            H: Fn(&str, &str, usize) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let handler = Arc::new(handler);

            let seen = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let handler = Arc::clone(&handler);
                    let seen = Arc::clone(&seen);
                    tokio::spawn(async move { serve(stream, handler.as_ref(), &seen).await });
                }
            });

            Self { addr, requests }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn settings(&self) -> PortalSettings {
            PortalSettings {
                credentials: Credentials {
                    username: "observer".to_string(),
                    password: "hunter2".to_string(),
                },
                login_url: self.url("/sso/login"),
                service_url: "https://portal.test/UserPortal/".to_string(),
                report_base_url: self.url("/reports/"),
            }
        }

        fn base(&self) -> Url {
            Url::parse(&self.url("/reports/")).unwrap()
        }

        fn requests(&self, method: &str, path: &str) -> Vec<Request> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.path() == path)
                .cloned()
                .collect()
        }
    }

    async fn serve<H>(mut stream: TcpStream, handler: &H, seen: &Mutex<Vec<Request>>)
    where
        H: Fn(&str, &str, usize) -> Reply,
    {
        let Some(request) = read_request(&mut stream).await else {
            return;
        };
        let reply = {
            let mut seen = seen.lock().unwrap();
            let earlier = seen
                .iter()
                .filter(|r| r.method == request.method && r.path() == request.path())
                .count();
            let reply = handler(&request.method, request.path(), earlier);
            seen.push(request);
            reply
        };

        match reply {
            Reply::Send(response) => {
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            Reply::Hangup => {}
            Reply::Stall => tokio::time::sleep(Duration::from_secs(30)).await,
        }
    }

    async fn read_request(stream: &mut TcpStream) -> Option<Request> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_len = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
        let mut lines = head.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?.to_string();
        let target = request_line.next()?.to_string();
        let content_length = lines
            .filter_map(|l| l.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < head_len + content_length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Some(Request {
            method,
            target,
            body: String::from_utf8_lossy(&buf[head_len..]).into_owned(),
        })
    }

    fn page(status: u16, body: &str) -> Reply {
        Reply::Send(format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        ))
    }

    /// A portal that accepts the login and serves run A, with B and C gone
    fn portal_routes(method: &str, path: &str, _earlier: usize) -> Reply {
        match (method, path) {
            ("GET", "/sso/login") => page(200, LOGIN_FORM),
            ("POST", "/sso/login") => page(200, "<h2>Log In Successful</h2>"),
            ("GET", "/reports/179A2010A.csv") => page(200, "pre\r\nid,status\r\n1,done\r\n"),
            ("GET", "/reports/179A2010B.csv") => page(404, "Not Found"),
            ("GET", "/reports/179A2010C.csv") => page(410, "Gone"),
            _ => page(500, "Internal Server Error"),
        }
    }

    #[test]
    fn test_extract_login_token() {
        let page = r#"
            <form method="post">
              <input type="hidden" name="lt" value="LT-1234-abcdEFGH-sso" />
              <input type="hidden" name="_eventId" value="submit" />
            </form>"#;
        assert_eq!(
            extract_login_token(page),
            Some("LT-1234-abcdEFGH-sso".to_string())
        );
    }

    #[test]
    fn test_extract_login_token_missing() {
        assert_eq!(extract_login_token("<html>maintenance</html>"), None);
    }

    #[test]
    fn test_not_found_statuses() {
        assert!(is_not_found(StatusCode::NOT_FOUND));
        assert!(is_not_found(StatusCode::GONE));
        assert!(!is_not_found(StatusCode::FORBIDDEN));
        assert!(!is_not_found(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_not_found(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_login_then_fetch_by_status() {
        let portal = StubPortal::start(portal_routes).await;
        let fetcher = PortalFetcher::login(&portal.settings(), portal.base())
            .await
            .unwrap();

        assert_eq!(
            fetcher.fetch("179A2010A").await.unwrap(),
            FetchOutcome::Found("pre\r\nid,status\r\n1,done\r\n".to_string())
        );
        assert_eq!(fetcher.fetch("179A2010B").await.unwrap(), FetchOutcome::NotFound);
        assert_eq!(fetcher.fetch("179A2010C").await.unwrap(), FetchOutcome::NotFound);

        match fetcher.fetch("179A2010D").await {
            Err(TransportError::Status { status, url }) => {
                assert_eq!(status, 500);
                assert!(url.ends_with("/reports/179A2010D.csv"));
            }
            other => panic!("Expected a status error, got {:?}", other),
        }

        let form = portal.requests("GET", "/sso/login");
        assert_eq!(form.len(), 1);
        assert!(form[0].target.contains("service=https"));

        let posts = portal.requests("POST", "/sso/login");
        assert_eq!(posts.len(), 1);
        for field in ["lt=LT-42-stub", "username=observer", "password=hunter2", "_eventId=submit"] {
            assert!(posts[0].body.contains(field), "missing {} in {}", field, posts[0].body);
        }
    }

    #[tokio::test]
    async fn test_login_without_success_marker_fails() {
        let portal = StubPortal::start(|method, path, earlier| match (method, path) {
            ("POST", "/sso/login") => page(200, "<p>Invalid credentials</p>"),
            _ => portal_routes(method, path, earlier),
        })
        .await;

        let result = PortalFetcher::login(&portal.settings(), portal.base()).await;
        assert!(matches!(result, Err(TransportError::Login(_))));
    }

    #[tokio::test]
    async fn test_login_page_without_token_fails() {
        let portal = StubPortal::start(|method, path, earlier| match (method, path) {
            ("GET", "/sso/login") => page(200, "<html>maintenance</html>"),
            _ => portal_routes(method, path, earlier),
        })
        .await;

        let result = PortalFetcher::login(&portal.settings(), portal.base()).await;
        assert!(matches!(result, Err(TransportError::Login(_))));
        assert!(portal.requests("POST", "/sso/login").is_empty());
    }

    #[tokio::test]
    async fn test_failed_login_post_is_retried_once() {
        let portal = StubPortal::start(|method, path, earlier| match (method, path) {
            ("POST", "/sso/login") if earlier == 0 => Reply::Hangup,
            _ => portal_routes(method, path, earlier),
        })
        .await;

        let fetcher = PortalFetcher::login(&portal.settings(), portal.base()).await;
        assert!(fetcher.is_ok());
        assert_eq!(portal.requests("POST", "/sso/login").len(), 2);
    }

    #[tokio::test]
    async fn test_login_post_gives_up_after_one_retry() {
        let portal = StubPortal::start(|method, path, earlier| match (method, path) {
            ("POST", "/sso/login") => Reply::Hangup,
            _ => portal_routes(method, path, earlier),
        })
        .await;

        let result = PortalFetcher::login(&portal.settings(), portal.base()).await;
        assert!(matches!(result, Err(TransportError::Http(_))));
        assert_eq!(portal.requests("POST", "/sso/login").len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_report_attempt_is_retried() {
        let portal = StubPortal::start(|method, path, earlier| match (method, path) {
            ("GET", "/reports/179A2010A.csv") if earlier == 0 => Reply::Stall,
            _ => portal_routes(method, path, earlier),
        })
        .await;

        let fetcher = PortalFetcher::login(&portal.settings(), portal.base())
            .await
            .unwrap()
            .with_request_timeout(Duration::from_millis(200));

        let outcome = fetcher.fetch("179A2010A").await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Found(_)));
        assert_eq!(portal.requests("GET", "/reports/179A2010A.csv").len(), 2);
    }
}
