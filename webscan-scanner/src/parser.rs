use crate::result::{EventHandler, Form, Input, PageFacts, PageSignals};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

pub const EVENT_HANDLER_ATTRIBUTES: &[&str] = &[
    "onerror",
    "onload",
    "onclick",
    "onmouseover",
    "onfocus",
    "onmouseenter",
    "onmouseleave",
];

pub const DOM_SINK_TOKENS: &[&str] = &[
    "document.write",
    "innerHTML",
    "outerHTML",
    "eval(",
    "setTimeout(",
    "setInterval(",
];

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("static selector"));
static FIELD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").expect("static selector"));
static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("static selector"));
static ANY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("*").expect("static selector"));

/// Extracts links, forms and client-side signals from HTML. Never fails: input the
/// HTML parser cannot make sense of, or an unusable base URL, gives empty facts.
pub struct PageParser;

impl PageParser {
    pub fn parse(html: &str, base_url: &str) -> PageFacts {
        let Ok(base) = Url::parse(base_url) else {
            return PageFacts::default();
        };
        if html.trim().is_empty() {
            return PageFacts::default();
        }

        let document = Html::parse_document(html);

        PageFacts {
            links: Self::extract_links(&document, &base),
            forms: Self::extract_forms(&document, &base),
            signals: PageSignals {
                inline_script: Self::has_inline_script(&document),
                event_handlers: Self::extract_event_handlers(&document),
                dom_sinks: Self::find_dom_sinks(html),
            },
        }
    }

    fn extract_links(document: &Html, base: &Url) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&LINK_SELECTOR) {
            if let Some(href) = element.value().attr("href")
                && let Some(absolute_url) = resolve_url(base, href)
                && seen.insert(absolute_url.clone())
            {
                links.push(absolute_url);
            }
        }

        links
    }

    fn extract_forms(document: &Html, base: &Url) -> Vec<Form> {
        document
            .select(&FORM_SELECTOR)
            .map(|form| {
                let action = form
                    .value()
                    .attr("action")
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .and_then(|a| base.join(a).ok())
                    .map(|mut u| {
                        u.set_fragment(None);
                        u.to_string()
                    })
                    .unwrap_or_else(|| base.to_string());

                // anything but post falls back to get, as browsers do
                let method = match form.value().attr("method") {
                    Some(m) if m.trim().eq_ignore_ascii_case("post") => "post",
                    _ => "get",
                };

                Form {
                    action,
                    method: method.to_string(),
                    inputs: form.select(&FIELD_SELECTOR).map(to_input).collect(),
                }
            })
            .collect()
    }

    fn has_inline_script(document: &Html) -> bool {
        document
            .select(&SCRIPT_SELECTOR)
            .any(|script| script.value().attr("src").is_none())
    }

    fn extract_event_handlers(document: &Html) -> Vec<EventHandler> {
        let mut seen = HashSet::new();
        let mut handlers = Vec::new();

        for element in document.select(&ANY_SELECTOR) {
            for (name, _) in element.value().attrs() {
                let attribute = name.to_ascii_lowercase();
                if EVENT_HANDLER_ATTRIBUTES.contains(&attribute.as_str()) {
                    let handler = EventHandler {
                        tag: element.value().name().to_ascii_lowercase(),
                        attribute,
                    };
                    if seen.insert(handler.clone()) {
                        handlers.push(handler);
                    }
                }
            }
        }

        handlers
    }

    fn find_dom_sinks(body: &str) -> Vec<String> {
        DOM_SINK_TOKENS
            .iter()
            .filter(|token| body.contains(*token))
            .map(|token| token.to_string())
            .collect()
    }
}

fn to_input(field: ElementRef<'_>) -> Input {
    let tag = field.value().name().to_ascii_lowercase();
    let input_type = if tag == "input" {
        field
            .value()
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string())
    } else {
        tag
    };

    Input {
        name: field.value().attr("name").map(str::to_string),
        input_type,
        value: field.value().attr("value").map(str::to_string),
    }
}

/// Resolve `href` against `base`, drop the fragment and keep only http(s) results.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel:, etc.
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.test/dir/page.html";

    #[test]
    fn test_links_are_resolved_deduplicated_and_filtered() {
        let html = r##"<html><body>
            <a href="/a">A</a>
            <a href="b?x=1#top">B</a>
            <a href="/a#again">A again</a>
            <a href="https://other.test/">Other</a>
            <a href="mailto:x@example.test">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="#frag">Frag</a>
            <a href="ftp://example.test/file">FTP</a>
        </body></html>"##;

        let facts = PageParser::parse(html, BASE);
        assert_eq!(
            facts.links,
            vec![
                "https://example.test/a".to_string(),
                "https://example.test/dir/b?x=1".to_string(),
                "https://other.test/".to_string(),
            ]
        );
    }

    #[test]
    fn test_forms_are_extracted() {
        let html = r#"<form action="/login" method="POST">
                <input type="hidden" name="token" value="t0k">
                <input name="username">
                <input type="password" name="password">
                <textarea name="note"></textarea>
                <select name="role"></select>
                <input type="submit">
            </form>
            <form><input type="search" name="q"></form>"#;

        let facts = PageParser::parse(html, BASE);
        assert_eq!(facts.forms.len(), 2);

        let login = &facts.forms[0];
        assert_eq!(login.action, "https://example.test/login");
        assert_eq!(login.method, "post");
        assert!(login.has_password_input());
        assert_eq!(login.inputs.len(), 6);
        assert_eq!(login.inputs[0].input_type, "hidden");
        assert_eq!(login.inputs[0].value.as_deref(), Some("t0k"));
        assert_eq!(login.inputs[1].input_type, "text");
        assert_eq!(login.inputs[3].input_type, "textarea");
        assert_eq!(login.inputs[4].input_type, "select");
        assert_eq!(login.inputs[5].name, None);

        let search = &facts.forms[1];
        assert_eq!(search.action, BASE);
        assert_eq!(search.method, "get");
    }

    #[test]
    fn test_signals() {
        let html = r#"<html><head>
            <script src="/app.js"></script>
            <script>document.getElementById('x').innerHTML = location.hash;</script>
            </head><body>
            <div onclick="x()">click</div>
            <div onclick="y()">again</div>
            <img src="a.png" onerror="z()">
            </body></html>"#;

        let facts = PageParser::parse(html, BASE);
        assert!(facts.signals.inline_script);
        assert_eq!(
            facts.signals.event_handlers,
            vec![
                EventHandler {
                    tag: "div".to_string(),
                    attribute: "onclick".to_string()
                },
                EventHandler {
                    tag: "img".to_string(),
                    attribute: "onerror".to_string()
                },
            ]
        );
        assert_eq!(facts.signals.dom_sinks, vec!["innerHTML".to_string()]);
    }

    #[test]
    fn test_external_script_only_is_not_inline() {
        let facts = PageParser::parse(r#"<script src="/a.js"></script>"#, BASE);
        assert!(!facts.signals.inline_script);
    }

    #[test]
    fn test_malformed_input_yields_empty_facts() {
        assert_eq!(PageParser::parse("", BASE), PageFacts::default());
        assert_eq!(
            PageParser::parse("<a href='/x'>x</a>", "not a url"),
            PageFacts::default()
        );

        // html5ever recovers from broken markup instead of failing
        let facts = PageParser::parse("<<<>>><a href=</div", BASE);
        assert!(facts.forms.is_empty());
    }
}
