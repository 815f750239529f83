use crate::error::{FetchError, FetchErrorKind, ScanError};
use crate::result::ResponseHeaders;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "webscan/0.1 (+passive web vulnerability scanner)";
pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    /// Query parameters for GET, url-encoded form fields for POST.
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the fetcher's default timeout for this request.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::Get,
            params: Vec::new(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn post_form(url: Url, fields: Vec<(String, String)>) -> Self {
        Self {
            url,
            method: Method::Post,
            params: fields,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    /// URL after redirects.
    pub url: String,
    pub status_code: u16,
    pub headers: ResponseHeaders,
    pub body: String,
    pub elapsed: Duration,
}

impl Response {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml+xml")
            })
            .unwrap_or(false)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// A single request/response exchange. Implementations must not retry; the crawler
/// treats one failure as final for that URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Follows at most `MAX_REDIRECTS` hops and never leaves the origin of the request.
/// A redirect to another origin is not followed; the 3xx response is returned as is.
fn same_origin_redirects() -> Policy {
    Policy::custom(|attempt| {
        let crosses_origin = attempt
            .previous()
            .first()
            .is_some_and(|first| first.origin() != attempt.url().origin());

        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if crosses_origin {
            debug!("Not following redirect to {}", attempt.url());
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// reqwest-backed fetcher. The cookie jar is shared with whoever holds a clone of
/// it, which is how a login flow hands an authenticated session to the crawl.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, ScanError> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    pub fn with_cookie_jar(config: &FetcherConfig, cookie_jar: Arc<Jar>) -> Result<Self, ScanError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(same_origin_redirects())
            .cookie_provider(cookie_jar)
            .build()
            .map_err(|e| ScanError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        debug!("Fetching {:?} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => {
                let builder = self.client.get(request.url.clone());
                if request.params.is_empty() {
                    builder
                } else {
                    builder.query(&request.params)
                }
            }
            Method::Post => self.client.post(request.url.clone()).form(&request.params),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, &e))?;

        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let headers: ResponseHeaders = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        // text() decodes using the charset from content-type, falling back to utf-8
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::new(FetchErrorKind::Body, &url, e.to_string()))?;

        Ok(Response {
            url: final_url,
            status_code,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path, query_param},
    };

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetcherConfig {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_status_headers_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(query_param("id", "7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .insert_header("set-cookie", "sid=abc")
                    .set_body_string("<html>hi</html>"),
            )
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/page", mock_server.uri())).unwrap();
        let mut request = FetchRequest::get(url);
        request.params.push(("id".to_string(), "7".to_string()));

        let response = fetcher().fetch(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.is_html());
        assert_eq!(response.headers.get("Set-Cookie"), Some("sid=abc"));
        assert_eq!(response.body, "<html>hi</html>");
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("username=admin"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/home"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/login", mock_server.uri())).unwrap();
        let request = FetchRequest::post_form(
            url,
            vec![("username".to_string(), "admin".to_string())],
        );

        let response = fetcher().fetch(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.url.ends_with("/home"));
        assert_eq!(response.body, "welcome");
    }

    #[tokio::test]
    async fn test_redirect_loop_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/loop", mock_server.uri())).unwrap();
        let err = fetcher().fetch(FetchRequest::get(url)).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::RedirectLoop);
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_is_not_followed() {
        let target = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/elsewhere", elsewhere.uri())),
            )
            .mount(&target)
            .await;
        Mock::given(method("GET"))
            .and(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(200).set_body_string("foreign"))
            .mount(&elsewhere)
            .await;

        let url = Url::parse(&format!("{}/go", target.uri())).unwrap();
        let response = fetcher().fetch(FetchRequest::get(url.clone())).await.unwrap();

        assert_eq!(response.status_code, 302);
        assert_eq!(response.url, url.to_string());
        assert_ne!(response.body, "foreign");
        assert!(elsewhere.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/slow", mock_server.uri())).unwrap();
        let request = FetchRequest::get(url).with_timeout(Duration::from_millis(50));
        let err = fetcher().fetch(request).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_an_error() {
        // port 9 (discard) is almost never listening locally
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = fetcher().fetch(FetchRequest::get(url)).await.unwrap_err();
        assert!(!err.cause.is_empty());
    }
}
