use super::{Detector, ProbeContext, ProbeError};
use crate::finding::{Confidence, Finding, Severity, VulnKind};
use async_trait::async_trait;
use url::Url;
use webscan_scanner::result::Page;

/// Path fragments that suggest a page sits behind a session.
const SESSION_PATH_HINTS: &[&str] = &["login", "signin", "account", "admin", "auth", "session"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
}

/// Parse one `Set-Cookie` header value. Returns `None` when there is no cookie name.
pub fn parse_set_cookie(header: &str) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, _value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = SetCookie {
        name: name.to_string(),
        secure: false,
        http_only: false,
    };
    for attribute in parts {
        let key = attribute.split('=').next().unwrap_or("").trim();
        if key.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if key.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        }
    }
    Some(cookie)
}

/// Audits cookies set by the page response.
pub struct AuthSessionDetector;

#[async_trait]
impl Detector for AuthSessionDetector {
    fn name(&self) -> &'static str {
        "auth_session"
    }

    async fn detect(&self, page: &Page, _ctx: &ProbeContext) -> Result<Vec<Finding>, ProbeError> {
        Ok(audit_cookies(page))
    }
}

fn audit_cookies(page: &Page) -> Vec<Finding> {
    let cookies: Vec<SetCookie> = page
        .headers
        .get_all("set-cookie")
        .filter_map(parse_set_cookie)
        .collect();

    if cookies.is_empty() {
        if needs_session(page) {
            return vec![Finding::new(
                VulnKind::AuthSession,
                &page.url,
                Severity::Medium,
                "No session cookie",
                "Page looks session-bound but the response sets no cookies",
            )];
        }
        return Vec::new();
    }

    cookies
        .iter()
        .filter_map(|cookie| {
            let missing: Vec<&str> = [("Secure", cookie.secure), ("HttpOnly", cookie.http_only)]
                .into_iter()
                .filter(|(_, present)| !present)
                .map(|(flag, _)| flag)
                .collect();
            if missing.is_empty() {
                return None;
            }
            Some(
                Finding::new(
                    VulnKind::AuthSession,
                    &page.url,
                    Severity::High,
                    "Insecure cookie flags",
                    format!("Cookie '{}' is missing {}", cookie.name, missing.join(" and ")),
                )
                .with_confidence(Confidence::Likely),
            )
        })
        .collect()
}

/// Password field, POST form, or a session-flavoured path.
fn needs_session(page: &Page) -> bool {
    if page
        .forms
        .iter()
        .any(|f| f.has_password_input() || f.method == "post")
    {
        return true;
    }

    Url::parse(&page.url)
        .map(|u| {
            let path = u.path().to_ascii_lowercase();
            SESSION_PATH_HINTS.iter().any(|hint| path.contains(hint))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_cookies(url: &str, cookies: &[&str]) -> Page {
        let mut page = Page::new(url.to_string(), 0);
        page.status_code = 200;
        for cookie in cookies {
            page.headers.insert("Set-Cookie", *cookie);
        }
        page
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie = parse_set_cookie("sid=abc; Path=/; secure; HTTPOnly").unwrap();
        assert_eq!(cookie.name, "sid");
        assert!(cookie.secure && cookie.http_only);

        let cookie = parse_set_cookie("theme=dark; Expires=Wed, 21 Oct 2026 07:28:00 GMT").unwrap();
        assert!(!cookie.secure && !cookie.http_only);

        assert!(parse_set_cookie("=novalue").is_none());
        assert!(parse_set_cookie("garbage").is_none());
    }

    #[test]
    fn test_one_finding_per_cookie() {
        let findings = audit_cookies(&page_with_cookies(
            "https://a.test/",
            &["a=1", "b=2; Secure", "c=3; Secure; HttpOnly"],
        ));
        assert_eq!(findings.len(), 2);
        assert!(findings[0].evidence.contains("'a' is missing Secure and HttpOnly"));
        assert!(findings[1].evidence.contains("'b' is missing HttpOnly"));
    }

    #[test]
    fn test_missing_session_cookie_on_login_path() {
        let findings = audit_cookies(&page_with_cookies("https://a.test/account/login", &[]));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);

        assert!(audit_cookies(&page_with_cookies("https://a.test/about", &[])).is_empty());
    }
}
