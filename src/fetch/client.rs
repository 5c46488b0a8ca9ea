//! HTTP client construction and the static fetch path.

use crate::config::{CrawlerConfig, PolitenessConfig};
use crate::fetch::{is_blocked_response, FetchError, FetchResult};
use crate::session::SessionContext;
use reqwest::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use url::Url;

/// Browser user-agents cycled when rotation is enabled. Robots decisions
/// always use the configured crawler user-agent, never these.
const ROTATING_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Builds the shared HTTP client.
///
/// Redirects are followed by reqwest up to the configured cap; the
/// response's final URL is what the rest of the pipeline sees.
pub fn build_http_client(
    user_agent: &str,
    crawler: &CrawlerConfig,
    politeness: &PolitenessConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(politeness.page_timeout())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(crawler.max_redirects as usize))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The static fetch path: one GET with session context applied.
pub struct Fetcher {
    client: Client,
    rotate_user_agents: bool,
    rotation: AtomicUsize,
}

impl Fetcher {
    pub fn new(client: Client, rotate_user_agents: bool) -> Self {
        Self {
            client,
            rotate_user_agents,
            rotation: AtomicUsize::new(0),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches one page. Non-2xx statuses are an `Ok` result; errors are
    /// reserved for failures without an HTTP status (timeouts, transport).
    pub async fn fetch(
        &self,
        url: &Url,
        session: &SessionContext,
    ) -> Result<FetchResult, FetchError> {
        let started = Instant::now();
        let mut request = self.client.get(url.clone());

        if self.rotate_user_agents {
            let index = self.rotation.fetch_add(1, Ordering::Relaxed);
            request = request.header(
                USER_AGENT,
                ROTATING_USER_AGENTS[index % ROTATING_USER_AGENTS.len()],
            );
        }

        for (name, value) in &session.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = session.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(token) = &session.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| classify_error(url, e))?;
        let latency = started.elapsed();

        let blocked = is_blocked_response(status, &headers, &body);
        if blocked {
            tracing::debug!(url = %url, status, "blocked response detected");
        }

        Ok(FetchResult {
            status,
            headers,
            body,
            final_url,
            latency,
            rendered: false,
            blocked,
        })
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(rotate: bool) -> Fetcher {
        let client = build_http_client(
            "TestBot/1.0",
            &CrawlerConfig::default(),
            &PolitenessConfig::default(),
        )
        .unwrap();
        Fetcher::new(client, rotate)
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hello</html>"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let result = fetcher(false)
            .fetch(&url, &SessionContext::default())
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert!(result.is_success());
        assert_eq!(result.body, "<html>hello</html>");
        assert!(!result.rendered);
        assert!(!result.blocked);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects_to_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let result = fetcher(false)
            .fetch(&url, &SessionContext::default())
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.final_url.path(), "/new");
    }

    #[tokio::test]
    async fn test_session_context_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .and(header("authorization", "Bearer token123"))
            .and(header("cookie", "sid=abc"))
            .and(header("x-custom", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut session = SessionContext::default();
        session.bearer_token = Some("token123".to_string());
        session.cookies.insert("sid".to_string(), "abc".to_string());
        session
            .headers
            .insert("X-Custom".to_string(), "yes".to_string());

        let url = Url::parse(&format!("{}/private", server.uri())).unwrap();
        let result = fetcher(false).fetch(&url, &session).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_429_is_blocked_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "10")
                    .set_body_string("too many requests"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/limited", server.uri())).unwrap();
        let result = fetcher(false)
            .fetch(&url, &SessionContext::default())
            .await
            .unwrap();

        assert!(result.blocked);
        assert_eq!(result.retry_after(), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_rotation_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", ROTATING_USER_AGENTS[0]))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/ua", server.uri())).unwrap();
        let result = fetcher(true)
            .fetch(&url, &SessionContext::default())
            .await
            .unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 1 is essentially never listening.
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let result = fetcher(false).fetch(&url, &SessionContext::default()).await;
        match result {
            Err(e) => assert!(e.is_transient()),
            Ok(_) => panic!("expected a network error"),
        }
    }
}
