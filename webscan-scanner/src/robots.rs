use crate::fetch::{FetchRequest, Fetcher};
use crate::scope::origin_key;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use url::Url;

pub const ROBOTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Disallow rules that apply to this scanner for one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Collect `Disallow:` rules from `User-agent: *` groups and from groups naming the
    /// product token of `user_agent`. `Allow:`, `Crawl-delay:` and sitemaps are ignored.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let product = product_token(user_agent);
        let mut disallow = Vec::new();

        let mut group_applies = false;
        let mut reading_agents = false;

        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // a user-agent line after rules starts a new group
                    if !reading_agents {
                        group_applies = false;
                        reading_agents = true;
                    }
                    let agent = value.to_ascii_lowercase();
                    if agent == "*" || (!agent.is_empty() && agent == product) {
                        group_applies = true;
                    }
                }
                "disallow" => {
                    reading_agents = false;
                    if group_applies && !value.is_empty() && !disallow.iter().any(|d| d == value) {
                        disallow.push(value.to_string());
                    }
                }
                _ => {
                    reading_agents = false;
                }
            }
        }

        Self { disallow }
    }

    /// `path` is the URL path plus query. Prefix matching makes every rule recursive.
    pub fn is_allowed(&self, path: &str) -> bool {
        !self.disallow.iter().any(|rule| path.starts_with(rule.as_str()))
    }

    pub fn disallowed(&self) -> &[String] {
        &self.disallow
    }
}

/// `webscan` for `webscan/0.1 (+...)`, lowercased.
pub fn product_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Per-scan robots.txt cache. Retrieval failures fail open.
pub struct RobotsGate {
    fetcher: Arc<dyn Fetcher>,
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<OnceCell<RobotsRules>>>>,
}

impl RobotsGate {
    pub fn new(fetcher: Arc<dyn Fetcher>, user_agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_allowed(&self, url: &Url) -> bool {
        let origin = origin_key(url);
        let cell = {
            let mut cache = self.cache.lock().await;
            cache.entry(origin.clone()).or_default().clone()
        };

        // concurrent first queries for one origin wait on the same fetch
        let rules = cell.get_or_init(|| self.load(&origin)).await;

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        rules.is_allowed(&path)
    }

    pub async fn cached_origins(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn load(&self, origin: &str) -> RobotsRules {
        let Ok(robots_url) = Url::parse(origin).and_then(|u| u.join("/robots.txt")) else {
            return RobotsRules::allow_all();
        };

        let request = FetchRequest::get(robots_url.clone()).with_timeout(ROBOTS_TIMEOUT);
        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_success() => {
                let rules = RobotsRules::parse(&response.body, &self.user_agent);
                debug!(
                    "Loaded {} with {} disallow rules",
                    robots_url,
                    rules.disallowed().len()
                );
                rules
            }
            Ok(response) => {
                debug!(
                    "{} returned {}, allowing everything",
                    robots_url, response.status_code
                );
                RobotsRules::allow_all()
            }
            Err(e) => {
                debug!("Could not fetch {}: {}, allowing everything", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetcherConfig, HttpFetcher};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    const UA: &str = "webscan/0.1 (+passive web vulnerability scanner)";

    #[test]
    fn test_parse_wildcard_group() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /admin\nDisallow: /private/ # comment\n",
            UA,
        );
        assert!(!rules.is_allowed("/admin"));
        assert!(!rules.is_allowed("/admin/users"));
        assert!(!rules.is_allowed("/private/x"));
        assert!(rules.is_allowed("/public"));
    }

    #[test]
    fn test_parse_ignores_other_agents() {
        let rules = RobotsRules::parse(
            "User-agent: googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /tmp\n",
            UA,
        );
        assert!(rules.is_allowed("/index"));
        assert!(!rules.is_allowed("/tmp/a"));
    }

    #[test]
    fn test_parse_matching_agent_group() {
        let rules = RobotsRules::parse("User-agent: WebScan\nDisallow: /\n", UA);
        assert!(!rules.is_allowed("/"));
        assert!(!rules.is_allowed("/anything"));
    }

    #[test]
    fn test_partial_agent_names_do_not_match() {
        for agent in ["web", "can", "scan", "webscanner", "0.1"] {
            let rules = RobotsRules::parse(&format!("User-agent: {}\nDisallow: /\n", agent), UA);
            assert!(rules.is_allowed("/"), "group for '{}' applied", agent);
        }
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token(UA), "webscan");
        assert_eq!(product_token("WebScan"), "webscan");
        assert_eq!(product_token("  curl/8.0"), "curl");
        assert_eq!(product_token(""), "");
    }

    #[test]
    fn test_parse_shared_group_and_empty_disallow() {
        let rules = RobotsRules::parse(
            "User-agent: otherbot\nUser-agent: *\nDisallow:\nAllow: /\n",
            UA,
        );
        assert!(rules.disallowed().is_empty());
        assert!(rules.is_allowed("/"));
    }

    fn gate(fetcher: HttpFetcher) -> RobotsGate {
        RobotsGate::new(Arc::new(fetcher), UA)
    }

    fn http_fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetcherConfig {
            user_agent: UA.to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_gate_fetches_once_per_origin() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /secret\n"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gate = gate(http_fetcher());
        let base = Url::parse(&mock_server.uri()).unwrap();

        assert!(gate.is_allowed(&base.join("/open").unwrap()).await);
        assert!(!gate.is_allowed(&base.join("/secret/x").unwrap()).await);
        assert!(!gate.is_allowed(&base.join("/secret?y=1").unwrap()).await);
        assert_eq!(gate.cached_origins().await, 1);
    }

    #[tokio::test]
    async fn test_gate_missing_robots_allows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let gate = gate(http_fetcher());
        let url = Url::parse(&format!("{}/anything", mock_server.uri())).unwrap();
        assert!(gate.is_allowed(&url).await);
    }

    #[tokio::test]
    async fn test_gate_fails_open_when_unreachable() {
        let gate = gate(http_fetcher());
        let url = Url::parse("http://127.0.0.1:9/admin").unwrap();
        assert!(gate.is_allowed(&url).await);
    }
}
