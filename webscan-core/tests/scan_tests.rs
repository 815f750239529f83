// End-to-end scan and login flow tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use webscan_core::finding::{Severity, VulnKind};
use webscan_core::login::{FormLogin, LoginError, LoginFlow};
use webscan_core::session::{ScanSession, run_scan};
use webscan_core::target::{Credentials, Target};
use webscan_scanner::error::FetchError;
use webscan_scanner::fetch::{FetchRequest, Fetcher, FetcherConfig, HttpFetcher, Response};
use webscan_scanner::result::ResponseHeaders;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

/// A small in-memory site. Unknown URLs are 404s.
struct FakeSite {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSite {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.fetched.lock().unwrap().push(url.clone());

        let mut headers = ResponseHeaders::new();
        headers.insert("content-type", "text/html; charset=utf-8");
        let (status_code, body) = match self.pages.get(&url) {
            Some(body) => (200, body.clone()),
            None => (404, "not found".to_string()),
        };
        Ok(Response {
            url,
            status_code,
            headers,
            body,
            elapsed: Duration::from_millis(1),
        })
    }
}

fn chain_site() -> FakeSite {
    FakeSite::new(&[
        (
            "https://example.test/",
            r#"<a href="/1">one</a> <a href="https://evil.test/steal">elsewhere</a>"#,
        ),
        ("https://example.test/1", r#"<a href="/2">two</a>"#),
        ("https://example.test/2", r#"<a href="/3">three</a>"#),
        ("https://example.test/3", r#"<a href="/4">four</a>"#),
        ("https://example.test/4", "<p>the end</p>"),
    ])
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test]
async fn test_chain_of_five_capped_at_three() {
    let site = Arc::new(chain_site());
    let target = Target::builder("https://example.test/")
        .max_pages(3)
        .worker_count(4)
        .politeness_delay(Duration::ZERO)
        .build()
        .unwrap();

    let report = ScanSession::with_fetcher(target, site.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.pages_scanned, 3);
    assert_eq!(report.pages_failed, 0);

    let fetched = site.fetched();
    assert!(
        fetched.iter().all(|u| !u.starts_with("https://evil.test")),
        "cross-origin fetch: {:?}",
        fetched
    );

    let pages: Vec<_> = fetched.iter().filter(|u| !u.ends_with("/robots.txt")).collect();
    assert_eq!(pages.len(), 3);
    let unique: HashSet<_> = pages.iter().collect();
    assert_eq!(unique.len(), pages.len());

    // every scanned page yields at least the informational XSS row
    let xss_rows = report.findings.iter().filter(|f| f.kind == VulnKind::Xss).count();
    assert!(xss_rows >= 3);
    assert_eq!(report.counts.total(), report.findings.len());
}

#[tokio::test]
async fn test_findings_follow_page_then_detector_order() {
    let site = Arc::new(FakeSite::new(&[(
        "https://example.test/",
        r#"<div onclick="x()">You have an error in your SQL syntax</div>"#,
    )]));
    let target = Target::builder("https://example.test/")
        .worker_count(1)
        .politeness_delay(Duration::ZERO)
        .build()
        .unwrap();

    let report = ScanSession::with_fetcher(target, site).run().await.unwrap();

    let detectors: Vec<_> = report.findings.iter().map(|f| f.detector.as_str()).collect();
    let first_sqli = detectors.iter().position(|d| *d == "sqli").unwrap();
    assert!(detectors[..first_sqli].iter().all(|d| *d == "xss"));
    assert!(detectors[first_sqli..].iter().all(|d| *d == "sqli"));
    assert!(!report.scan_id.is_empty());
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_scan_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<html><body><a href="/item?id=5">item</a></body></html>"#),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .insert_header("set-cookie", "sid=1; Path=/")
                .set_body_string("<p>You have an error in your SQL syntax near '5'</p>"),
        )
        .mount(&mock_server)
        .await;

    let target = Target::builder(format!("{}/", mock_server.uri()))
        .worker_count(2)
        .politeness_delay(Duration::ZERO)
        .request_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let report = run_scan(target).await.unwrap();

    assert_eq!(report.pages_scanned, 2);
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.kind == VulnKind::SqlInjection && f.severity == Severity::High)
    );
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.kind == VulnKind::AuthSession && f.evidence.contains("sid"))
    );
    // every id returns the same body, so no access-control finding
    assert!(!report.findings.iter().any(|f| f.kind == VulnKind::AccessControl));
}

#[tokio::test]
async fn test_unreachable_target_is_an_empty_report() {
    let target = Target::builder("http://127.0.0.1:9/")
        .worker_count(1)
        .politeness_delay(Duration::ZERO)
        .respect_robots(false)
        .request_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let report = run_scan(target).await.unwrap();

    assert_eq!(report.pages_scanned, 0);
    assert_eq!(report.pages_failed, 1);
    assert!(report.findings.is_empty());
}

// ============================================================================
// Login Flow Tests
// ============================================================================

const LOGIN_FORM: &str = r#"<html><body>
    <form action="/login" method="post">
        <input type="hidden" name="csrf" value="abc123">
        <input type="text" name="username">
        <input type="password" name="password">
        <button type="submit">Sign in</button>
    </form>
</body></html>"#;

fn http_fetcher() -> HttpFetcher {
    HttpFetcher::new(&FetcherConfig {
        timeout: Duration::from_secs(2),
        ..FetcherConfig::default()
    })
    .unwrap()
}

fn credentials(server: &MockServer) -> Credentials {
    Credentials {
        login_url: Url::parse(&format!("{}/login", server.uri())).unwrap(),
        username: "admin".to_string(),
        password: "s3cret".to_string(),
    }
}

async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(LOGIN_FORM),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_form_login_shares_session_cookie() {
    let mock_server = MockServer::start().await;
    mount_login_page(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("csrf=abc123"))
        .and(body_string_contains("username=admin"))
        .and(body_string_contains("password=s3cret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=valid; Path=/")
                .set_body_string("Welcome"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .and(header("cookie", "session=valid"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret dashboard"))
        .mount(&mock_server)
        .await;

    let fetcher = http_fetcher();
    FormLogin
        .login(&fetcher, &credentials(&mock_server))
        .await
        .unwrap();

    let dashboard = Url::parse(&format!("{}/dashboard", mock_server.uri())).unwrap();
    let response = fetcher.fetch(FetchRequest::get(dashboard)).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "secret dashboard");
}

#[tokio::test]
async fn test_form_login_rejected_when_form_returns() {
    let mock_server = MockServer::start().await;
    mount_login_page(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(LOGIN_FORM),
        )
        .mount(&mock_server)
        .await;

    let result = FormLogin.login(&http_fetcher(), &credentials(&mock_server)).await;
    assert!(matches!(result, Err(LoginError::StillOnLoginPage)));
}

#[tokio::test]
async fn test_form_login_without_form() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<p>Single sign-on only</p>"),
        )
        .mount(&mock_server)
        .await;

    let result = FormLogin.login(&http_fetcher(), &credentials(&mock_server)).await;
    assert!(matches!(result, Err(LoginError::NoLoginForm(_))));
}

#[tokio::test]
async fn test_failed_login_does_not_stop_the_scan() {
    let site = Arc::new(FakeSite::new(&[("https://example.test/", "<p>public</p>")]));
    let target = Target::builder("https://example.test/")
        .worker_count(1)
        .politeness_delay(Duration::ZERO)
        .credentials("https://example.test/login", "admin", "nope")
        .build()
        .unwrap();

    let report = ScanSession::with_fetcher(target, site).run().await.unwrap();
    assert_eq!(report.pages_scanned, 1);
}

#[tokio::test]
async fn test_authenticated_scan_never_visits_logout() {
    let mock_server = MockServer::start().await;
    mount_login_page(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=valid; Path=/")
                .set_body_string("Welcome"),
        )
        .mount(&mock_server)
        .await;
    for (route, body) in [
        ("/", r#"<a href="/logout.php">Logout</a> <a href="/members">Members</a>"#),
        ("/members", "<p>members area</p>"),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("cookie", "session=valid"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/logout.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let target = Target::builder(format!("{}/", mock_server.uri()))
        .worker_count(2)
        .politeness_delay(Duration::ZERO)
        .respect_robots(false)
        .credentials(format!("{}/login", mock_server.uri()), "admin", "s3cret")
        .build()
        .unwrap();

    let report = run_scan(target).await.unwrap();

    assert_eq!(report.pages_scanned, 2);
    assert_eq!(report.pages_failed, 0);
    mock_server.verify().await;
}
