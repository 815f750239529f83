use url::Url;

/// Dedup key for a URL: scheme, host, port, path and query with the fragment removed.
/// Scheme and host case and default ports are already canonicalised by `Url`.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.to_string()
}

/// `scheme://host[:port]` as used for robots and politeness bookkeeping.
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Crawl scope: the scheme, host and port of the seed URL.
#[derive(Debug, Clone)]
pub struct Scope {
    origin: url::Origin,
}

impl Scope {
    pub fn new(seed: &Url) -> Self {
        Self {
            origin: seed.origin(),
        }
    }

    pub fn is_in_scope(&self, url: &Url) -> bool {
        self.origin.is_tuple() && url.origin() == self.origin
    }

    pub fn is_in_scope_str(&self, raw: &str) -> bool {
        Url::parse(raw)
            .map(|u| self.is_in_scope(&u))
            .unwrap_or(false)
    }

    pub fn origin(&self) -> String {
        self.origin.ascii_serialization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_fragment_keeps_query() {
        let url = Url::parse("HTTPS://Example.test:443/a/b?x=1#frag").unwrap();
        assert_eq!(normalize_url(&url), "https://example.test/a/b?x=1");
    }

    #[test]
    fn test_same_origin_is_port_sensitive() {
        let scope = Scope::new(&Url::parse("https://example.test/").unwrap());
        assert!(scope.is_in_scope_str("https://example.test/other"));
        assert!(scope.is_in_scope_str("https://example.test:443/other"));
        assert!(!scope.is_in_scope_str("https://example.test:8443/other"));
        assert!(!scope.is_in_scope_str("http://example.test/other"));
        assert!(!scope.is_in_scope_str("https://sub.example.test/"));
    }

    #[test]
    fn test_origin_key() {
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(origin_key(&url), "http://127.0.0.1:8080");
    }
}
