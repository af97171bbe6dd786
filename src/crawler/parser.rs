//! Content parser for fetched pages
//!
//! Dispatches a page body by content type:
//! - Binary content (images, audio, video, non-markup application types)
//! - Plain text
//! - HTML, the default for everything else, with text, title and outgoing links

use crate::crawler::fetcher::PageContent;
use crate::url::canonicalize;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Errors that stop a page from being parsed
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported content type: {0}")]
    Unsupported(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// A link found on a page, already resolved and canonical
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,

    /// Text of the `<a>` element, empty for other link sources
    pub anchor: String,
}

/// Everything extracted from an HTML page
#[derive(Debug, Clone, Default)]
pub struct HtmlParseData {
    pub html: String,
    pub text: String,
    pub title: Option<String>,
    pub links: Vec<ExtractedLink>,
}

/// Parsed form of a page body
#[derive(Debug, Clone)]
pub enum ParseData {
    Html(HtmlParseData),
    Text(String),
    Binary,
}

impl ParseData {
    /// Outgoing links, empty for anything but HTML
    pub fn links(&self) -> &[ExtractedLink] {
        match self {
            ParseData::Html(data) => &data.links,
            _ => &[],
        }
    }
}

/// Turns fetched bytes into [`ParseData`]
#[derive(Debug, Clone)]
pub struct Parser {
    include_binary: bool,
    max_outgoing_links: usize,
}

impl Parser {
    pub fn new(include_binary: bool, max_outgoing_links: usize) -> Self {
        Self {
            include_binary,
            max_outgoing_links,
        }
    }

    /// Parses a page body
    ///
    /// # Arguments
    ///
    /// * `content` - The fetched body with its declared content type
    /// * `context_url` - URL relative links are resolved against, unless the page
    ///   declares a `<base href>`
    ///
    /// # Returns
    ///
    /// * `Ok(ParseData)` - The parsed page
    /// * `Err(ParseError)` - Binary content while binary parsing is off, or an
    ///   empty document
    pub fn parse(&self, content: &PageContent, context_url: &str) -> Result<ParseData, ParseError> {
        if content.is_binary() {
            if self.include_binary {
                return Ok(ParseData::Binary);
            }
            return Err(ParseError::Unsupported(
                content.content_type.clone().unwrap_or_default(),
            ));
        }

        if content.is_plain_text() {
            return Ok(ParseData::Text(content.text()));
        }

        self.parse_html(&content.text(), context_url)
            .map(ParseData::Html)
    }

    /// Parses an HTML document and extracts its outgoing links
    ///
    /// # Example
    ///
    /// ```
    /// use nanocrawl::crawler::Parser;
    ///
    /// let parser = Parser::new(false, 100);
    /// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
    /// let parsed = parser.parse_html(html, "http://example.com/").unwrap();
    /// assert_eq!(parsed.title, Some("Test".to_string()));
    /// assert_eq!(parsed.links[0].url, "http://example.com/page");
    /// ```
    pub fn parse_html(&self, html: &str, context_url: &str) -> Result<HtmlParseData, ParseError> {
        let html = html.trim();
        if html.is_empty() {
            return Err(ParseError::Malformed("empty document".to_string()));
        }

        let document = Html::parse_document(html);

        let context_url = extract_base_url(&document, context_url);
        let mut links = Vec::new();
        for (href, anchor) in extract_raw_links(&document) {
            if links.len() >= self.max_outgoing_links {
                break;
            }
            if let Some(url) = resolve_link(&href, &context_url) {
                links.push(ExtractedLink { url, anchor });
            }
        }

        Ok(HtmlParseData {
            html: html.to_string(),
            text: extract_body_text(&document),
            title: extract_title(&document),
            links,
        })
    }
}

fn select_all<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn extract_title(document: &Html) -> Option<String> {
    select_all(document, "title")
        .first()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn extract_body_text(document: &Html) -> String {
    select_all(document, "body")
        .first()
        .map(element_text)
        .unwrap_or_default()
}

/// URL links are resolved against: `<base href>` resolved against the page URL, or
/// the page URL itself
fn extract_base_url(document: &Html, page_url: &str) -> String {
    let base = select_all(document, "base[href]")
        .first()
        .and_then(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string);

    let Some(base) = base else {
        return page_url.to_string();
    };
    match Url::parse(page_url).and_then(|page| page.join(&base)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => base,
    }
}

/// Target of a refresh value such as `0;URL=http://example.com/next`
fn refresh_target(content: &str) -> Option<&str> {
    // "url=" is ASCII, so the match position is always a char boundary
    let start = content
        .as_bytes()
        .windows(4)
        .position(|window| window.eq_ignore_ascii_case(b"url="))?;
    let target = content[start + 4..].trim();
    (!target.is_empty()).then_some(target)
}

/// Collects `(href, anchor)` pairs in source-group order
///
/// Order: `<link>`, `<a>`, `<iframe>`, `<frame>`, `<embed>`, then meta refresh and
/// location redirects. Only `<a>` contributes anchor text.
fn extract_raw_links(document: &Html) -> Vec<(String, String)> {
    let mut raw = Vec::new();

    let sources = [
        ("link[href]", "href", false),
        ("a[href]", "href", true),
        ("iframe[src]", "src", false),
        ("frame[src]", "src", false),
        ("embed[src]", "src", false),
    ];
    for (selector, attribute, with_anchor) in sources {
        for element in select_all(document, selector) {
            let Some(href) = element.value().attr(attribute) else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            let anchor = if with_anchor {
                element_text(&element)
            } else {
                String::new()
            };
            raw.push((href.to_string(), anchor));
        }
    }

    for element in select_all(document, "meta[http-equiv][content]") {
        let (Some(equiv), Some(content)) = (
            element.value().attr("http-equiv"),
            element.value().attr("content"),
        ) else {
            continue;
        };
        let content = content.trim();

        match equiv.trim().to_lowercase().as_str() {
            "refresh" => {
                if let Some(target) = refresh_target(content) {
                    raw.push((target.to_string(), String::new()));
                }
            }
            "location" if !content.is_empty() => {
                raw.push((content.to_string(), String::new()));
            }
            _ => {}
        }
    }

    raw
}

/// Resolves and canonicalizes an href, or drops it
///
/// Hrefs mentioning `javascript:`, `mailto:` or an `@` anywhere after an optional
/// leading `http://` are dropped, as is anything that does not resolve to an http(s)
/// URL.
fn resolve_link(href: &str, context_url: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let lowered = href.to_lowercase();
    let without_scheme = lowered.strip_prefix("http://").unwrap_or(&lowered);
    if without_scheme.contains("javascript:")
        || without_scheme.contains("mailto:")
        || without_scheme.contains('@')
    {
        return None;
    }

    canonicalize(href, Some(context_url)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = "http://example.com/dir/page.html";

    fn parser() -> Parser {
        Parser::new(false, 100)
    }

    fn content(body: &str, content_type: &str) -> PageContent {
        PageContent {
            data: body.as_bytes().to_vec(),
            content_type: Some(content_type.to_string()),
            ..PageContent::default()
        }
    }

    fn urls(data: &HtmlParseData) -> Vec<&str> {
        data.links.iter().map(|l| l.url.as_str()).collect()
    }

    #[test]
    fn test_extract_title_and_text() {
        let html = r#"<html><head><title>  Test Page  </title></head><body><p>Hello</p> <p>world</p></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(parsed.title, Some("Test Page".to_string()));
        assert_eq!(parsed.text, "Hello world");
    }

    #[test]
    fn test_no_title() {
        let parsed = parser()
            .parse_html("<html><body>x</body></html>", CONTEXT)
            .unwrap();
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_anchor_text_only_from_a_elements() {
        let html = r#"<html><head><link rel="alternate" href="/rss"></head>
            <body><a href="/a">feed</a><iframe src="/frame"></iframe></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(
            parsed.links,
            vec![
                ExtractedLink {
                    url: "http://example.com/rss".to_string(),
                    anchor: String::new()
                },
                ExtractedLink {
                    url: "http://example.com/a".to_string(),
                    anchor: "feed".to_string()
                },
                ExtractedLink {
                    url: "http://example.com/frame".to_string(),
                    anchor: String::new()
                },
            ]
        );
    }

    #[test]
    fn test_relative_links_resolve_against_context() {
        let html = r#"<html><body><a href="other.html">x</a><a href="../up">y</a></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(
            urls(&parsed),
            vec!["http://example.com/dir/other.html", "http://example.com/up"]
        );
    }

    #[test]
    fn test_base_element_overrides_context() {
        let html = r#"<html><head><base href="http://other.test/root/"></head>
            <body><a href="page">x</a></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(urls(&parsed), vec!["http://other.test/root/page"]);
    }

    #[test]
    fn test_relative_base_resolves_against_page() {
        let html = r#"<html><head><base href="/sub/"></head>
            <body><a href="page">x</a></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(urls(&parsed), vec!["http://example.com/sub/page"]);
    }

    #[test]
    fn test_meta_refresh_with_non_ascii_content() {
        let html = "<html><head><meta http-equiv=\"refresh\" content=\"\u{130}url=\u{e9}\u{e9}\">\
            </head><body></body></html>";
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert!(parsed.links[0].url.starts_with("http://example.com/dir/"));
    }

    #[test]
    fn test_refresh_target() {
        assert_eq!(refresh_target("5;URL=/next"), Some("/next"));
        assert_eq!(refresh_target("\u{130}\u{130}Url= /x "), Some("/x"));
        assert_eq!(refresh_target("url="), None);
        assert_eq!(refresh_target("30"), None);
    }

    #[test]
    fn test_meta_refresh_and_location() {
        let html = r#"<html><head>
            <meta http-equiv="Refresh" content="0; URL=/next">
            <meta http-equiv="location" content="http://moved.test/">
            <meta http-equiv="refresh" content="30">
            </head><body></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(
            urls(&parsed),
            vec!["http://example.com/next", "http://moved.test/"]
        );
    }

    #[test]
    fn test_skips_script_mail_and_at_links() {
        let html = r#"<html><body>
            <a href="javascript:void(0)">a</a>
            <a href="MAILTO:me@example.com">b</a>
            <a href="http://user@example.com/">c</a>
            <a href="/ok">d</a>
            </body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(urls(&parsed), vec!["http://example.com/ok"]);
    }

    #[test]
    fn test_drops_non_http_links() {
        let html = r#"<html><body><a href="ftp://example.com/f">a</a><a href="">b</a></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_links_are_canonical() {
        let html = r#"<html><body><a href="HTTP://Example.COM//x/?b=2&a=1#frag">a</a></body></html>"#;
        let parsed = parser().parse_html(html, CONTEXT).unwrap();
        assert_eq!(urls(&parsed), vec!["http://example.com/x/?a=1&b=2"]);
    }

    #[test]
    fn test_outgoing_link_cap() {
        let body: String = (0..10).map(|i| format!(r#"<a href="/p{}">x</a>"#, i)).collect();
        let html = format!("<html><body>{}</body></html>", body);
        let parsed = Parser::new(false, 3).parse_html(&html, CONTEXT).unwrap();
        assert_eq!(parsed.links.len(), 3);
    }

    #[test]
    fn test_empty_document_is_malformed() {
        let result = parser().parse(&content("   ", "text/html"), CONTEXT);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_plain_text_dispatch() {
        let parsed = parser()
            .parse(&content("just text", "text/plain; charset=utf-8"), CONTEXT)
            .unwrap();
        assert!(matches!(parsed, ParseData::Text(ref t) if t == "just text"));
        assert!(parsed.links().is_empty());
    }

    #[test]
    fn test_binary_dispatch() {
        let pdf = content("%PDF-1.4", "application/pdf");
        assert!(matches!(
            parser().parse(&pdf, CONTEXT),
            Err(ParseError::Unsupported(_))
        ));
        assert!(matches!(
            Parser::new(true, 100).parse(&pdf, CONTEXT),
            Ok(ParseData::Binary)
        ));
    }

    #[test]
    fn test_missing_content_type_parses_as_html() {
        let page = PageContent {
            data: b"<html><body><a href='/x'>x</a></body></html>".to_vec(),
            ..PageContent::default()
        };
        let parsed = parser().parse(&page, CONTEXT).unwrap();
        assert_eq!(parsed.links().len(), 1);
    }

    #[test]
    fn test_xhtml_is_not_binary() {
        let page = content("<html><body>x</body></html>", "application/xhtml+xml");
        assert!(matches!(parser().parse(&page, CONTEXT), Ok(ParseData::Html(_))));
    }
}
