//! Best-effort extraction of static resource references from HTML.

use select::document::Document;
use select::predicate::Name;
use url::Url;

/// Resolved references found in one page, in document order per kind,
/// plus the number of references that could not be resolved. Counting the
/// skips keeps "no resources" distinguishable from "extraction trouble".
#[derive(Debug, Default)]
pub struct ExtractedResources {
    pub stylesheets: Vec<Url>,
    pub scripts: Vec<Url>,
    pub images: Vec<Url>,
    pub malformed: u64,
}

impl ExtractedResources {
    pub fn total(&self) -> usize {
        self.stylesheets.len() + self.scripts.len() + self.images.len()
    }
}

pub struct HtmlParser {
    page_url: Url,
}

impl HtmlParser {
    pub fn new(page_url: Url) -> Self {
        Self { page_url }
    }

    /// Collects stylesheet `href`, script `src`, and image `src`
    /// references and resolves each against the page URL. Malformed HTML
    /// never aborts extraction; `select` keeps whatever it can parse, and
    /// unresolvable references are skipped and counted.
    pub fn extract_resources(&self, html: &str) -> ExtractedResources {
        let document = Document::from(html);
        let mut out = ExtractedResources::default();

        for link in document.find(Name("link")) {
            let is_stylesheet = link.attr("rel").map_or(false, |rel| {
                rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet"))
            });
            if !is_stylesheet {
                continue;
            }
            if let Some(href) = link.attr("href") {
                if let Some(url) = self.resolve_counted(href, &mut out.malformed) {
                    out.stylesheets.push(url);
                }
            }
        }

        for script in document.find(Name("script")) {
            if let Some(src) = script.attr("src") {
                if let Some(url) = self.resolve_counted(src, &mut out.malformed) {
                    out.scripts.push(url);
                }
            }
        }

        for img in document.find(Name("img")) {
            if let Some(src) = img.attr("src") {
                if let Some(url) = self.resolve_counted(src, &mut out.malformed) {
                    out.images.push(url);
                }
            }
        }

        out
    }

    /// Resolution with accounting: empty attributes are ignored outright,
    /// anything non-empty that fails to resolve bumps the malformed count.
    fn resolve_counted(&self, raw: &str, malformed: &mut u64) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let resolved = self.resolve(raw);
        if resolved.is_none() {
            *malformed += 1;
        }
        resolved
    }

    /// Resolves a raw attribute value to an absolute URL. `Url::join`
    /// handles relative and protocol-relative references against the page.
    fn resolve(&self, raw: &str) -> Option<Url> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Url::parse(raw).ok()
        } else {
            self.page_url.join(raw).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(page: &str) -> HtmlParser {
        HtmlParser::new(Url::parse(page).unwrap())
    }

    #[test]
    fn extracts_all_three_kinds() {
        let html = r#"
            <html>
              <head>
                <link rel="stylesheet" href="/style.css">
                <link rel="icon" href="/favicon.ico">
                <script src="/app.js"></script>
                <script>inlineIsIgnored();</script>
              </head>
              <body>
                <img src="/logo.png" alt="logo">
              </body>
            </html>
        "#;
        let out = parser("https://example.com/").extract_resources(html);
        assert_eq!(
            out.stylesheets,
            vec![Url::parse("https://example.com/style.css").unwrap()]
        );
        assert_eq!(
            out.scripts,
            vec![Url::parse("https://example.com/app.js").unwrap()]
        );
        assert_eq!(
            out.images,
            vec![Url::parse("https://example.com/logo.png").unwrap()]
        );
        assert_eq!(out.malformed, 0);
    }

    #[test]
    fn resolves_relative_and_protocol_relative() {
        let html = r#"
            <link rel="stylesheet" href="../style.css">
            <script src="./js/app.js"></script>
            <img src="//cdn.example.com/i.png">
        "#;
        let out = parser("https://example.com/sub/dir/").extract_resources(html);
        assert_eq!(out.stylesheets[0].as_str(), "https://example.com/sub/style.css");
        assert_eq!(out.scripts[0].as_str(), "https://example.com/sub/dir/js/app.js");
        assert_eq!(out.images[0].as_str(), "https://cdn.example.com/i.png");
    }

    #[test]
    fn malformed_references_are_counted_not_fatal() {
        let html = r#"
            <link rel="stylesheet" href="http://[broken">
            <img src="/fine.png">
        "#;
        let out = parser("https://example.com/").extract_resources(html);
        assert_eq!(out.images.len(), 1);
        assert!(out.stylesheets.is_empty());
        assert_eq!(out.malformed, 1);
    }

    #[test]
    fn empty_attributes_are_skipped_silently() {
        let html = r#"<img src=""> <script src="  "></script>"#;
        let out = parser("https://example.com/").extract_resources(html);
        assert_eq!(out.total(), 0);
        assert_eq!(out.malformed, 0);
    }

    #[test]
    fn broken_html_still_yields_what_parses() {
        let html = r#"<html><body><img src="/a.png"<div><link rel=stylesheet href=/b.css"#;
        let out = parser("https://example.com/").extract_resources(html);
        assert!(out.total() >= 1, "best-effort parse should find something");
    }

    #[test]
    fn rel_attribute_may_list_multiple_tokens() {
        let html = r#"<link rel="preload stylesheet" href="/s.css">"#;
        let out = parser("https://example.com/").extract_resources(html);
        assert_eq!(out.stylesheets.len(), 1);
    }
}
