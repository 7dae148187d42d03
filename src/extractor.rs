use anyhow::{Context, Result};
use regex::Regex;
use select::document::Document;
use select::predicate::{Attr, Child, Name};
use std::collections::HashSet;

/// Where a reference was found, which decides its download pool and the
/// statistics class it counts toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Stylesheet,
    Script,
    Font,
    SvgUse,
}

/// A single asset reference as written in the source document. Ephemeral;
/// resolution against a base URL happens at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReference {
    pub url: String,
    pub kind: AssetKind,
}

pub const FONT_EXTENSIONS: [&str; 5] = ["woff", "woff2", "ttf", "eot", "otf"];
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Lazy-load data attributes that carry the real image URL before the
/// site's own script promotes them to `src`.
pub const LAZY_SOURCE_ATTRIBUTES: [&str; 3] = ["data-src", "data-lazy-src", "data-original"];

const CSS_URL_PATTERN: &str = r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#;

/// Scans rendered HTML and stylesheet text for asset references.
pub struct ReferenceExtractor {
    css_url: Regex,
}

impl ReferenceExtractor {
    pub fn new() -> Result<Self> {
        let css_url = Regex::new(CSS_URL_PATTERN).context("failed to compile url() pattern")?;
        Ok(Self { css_url })
    }

    /// Extract every asset reference from a rendered HTML document, in
    /// document order, deduplicated by reference string.
    pub fn extract_references(&self, html: &str) -> Vec<AssetReference> {
        let document = Document::from(html);
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for node in document.find(Name("link")) {
            let is_stylesheet = node
                .attr("rel")
                .map(|rel| rel.contains("stylesheet"))
                .unwrap_or(false);
            if is_stylesheet {
                if let Some(href) = node.attr("href") {
                    push_reference(&mut refs, &mut seen, href, AssetKind::Stylesheet);
                }
            }
        }

        for node in document.find(Name("script")) {
            if let Some(src) = node.attr("src") {
                push_reference(&mut refs, &mut seen, src, AssetKind::Script);
            }
        }

        for node in document.find(Name("img")) {
            if let Some(src) = node.attr("src") {
                push_reference(&mut refs, &mut seen, src, AssetKind::Image);
            }
            if let Some(srcset) = node.attr("srcset") {
                for (url, _) in parse_srcset(srcset) {
                    push_reference(&mut refs, &mut seen, &url, AssetKind::Image);
                }
            }
            for attr in LAZY_SOURCE_ATTRIBUTES {
                if let Some(url) = node.attr(attr) {
                    push_reference(&mut refs, &mut seen, url, AssetKind::Image);
                }
            }
        }

        for node in document.find(Child(Name("picture"), Name("source"))) {
            if let Some(srcset) = node.attr("srcset") {
                for (url, _) in parse_srcset(srcset) {
                    push_reference(&mut refs, &mut seen, &url, AssetKind::Image);
                }
            }
        }

        for node in document.find(Attr("style", ())) {
            if let Some(style) = node.attr("style") {
                if style.contains("background") {
                    for url in self.extract_css_urls(style) {
                        push_reference(&mut refs, &mut seen, &url, AssetKind::Image);
                    }
                }
            }
        }

        for node in document.find(Name("use")) {
            let href = node.attr("href").or_else(|| node.attr("xlink:href"));
            if let Some(href) = href {
                push_reference(&mut refs, &mut seen, href, AssetKind::SvgUse);
            }
        }

        for node in document.find(Name("video")) {
            if let Some(poster) = node.attr("poster") {
                push_reference(&mut refs, &mut seen, poster, AssetKind::Image);
            }
        }

        refs
    }

    /// Extract every `url(...)` occurrence from stylesheet text, skipping
    /// `data:` payloads. Deduplicated, source order preserved.
    pub fn extract_css_urls(&self, css: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for capture in self.css_url.captures_iter(css) {
            let url = capture[1].trim().to_string();
            if url.is_empty() || url.starts_with("data:") {
                continue;
            }
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
        urls
    }
}

fn push_reference(
    refs: &mut Vec<AssetReference>,
    seen: &mut HashSet<String>,
    url: &str,
    kind: AssetKind,
) {
    let url = url.trim();
    if url.is_empty() || url.starts_with("data:") || url.starts_with('#') {
        return;
    }
    if seen.insert(url.to_string()) {
        refs.push(AssetReference {
            url: url.to_string(),
            kind,
        });
    }
}

/// Split a `srcset` value into (URL, descriptor) entries. Only the URL
/// token participates in resolution; descriptors pass through verbatim.
pub fn parse_srcset(srcset: &str) -> Vec<(String, Option<String>)> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut tokens = entry.split_whitespace();
            let url = tokens.next()?.to_string();
            let descriptor = tokens.next().map(|d| d.to_string());
            Some((url, descriptor))
        })
        .collect()
}

/// Classify a URL found inside stylesheet text by extension. Unknown
/// extensions are not fetched from CSS at all.
pub fn classify_css_reference(url: &str) -> Option<AssetKind> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    if FONT_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Font)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(AssetKind::Image)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ReferenceExtractor {
        ReferenceExtractor::new().unwrap()
    }

    #[test]
    fn test_extract_all_scan_sites() {
        let html = r##"
            <html>
              <head>
                <link rel="stylesheet" href="/css/site.css">
                <link rel="icon" href="/favicon.ico">
                <script src="/js/app.js"></script>
              </head>
              <body>
                <img src="/hero.png" srcset="/hero-2x.png 2x, /hero-3x.png 3x">
                <picture>
                  <source srcset="/wide.webp 1024w">
                  <img src="/narrow.png">
                </picture>
                <div style="background-image: url('/bg.jpg')">tile</div>
                <svg><use href="/sprite.svg#icon"></use></svg>
                <svg><use href="#local-icon"></use></svg>
                <video poster="/poster.jpg"></video>
              </body>
            </html>
        "##;

        let refs = extractor().extract_references(html);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();

        assert!(urls.contains(&"/css/site.css"));
        assert!(urls.contains(&"/js/app.js"));
        assert!(urls.contains(&"/hero.png"));
        assert!(urls.contains(&"/hero-2x.png"));
        assert!(urls.contains(&"/hero-3x.png"));
        assert!(urls.contains(&"/wide.webp"));
        assert!(urls.contains(&"/narrow.png"));
        assert!(urls.contains(&"/bg.jpg"));
        assert!(urls.contains(&"/sprite.svg#icon"));
        assert!(urls.contains(&"/poster.jpg"));
        // rel=icon is not a stylesheet, same-document use is skipped
        assert!(!urls.contains(&"/favicon.ico"));
        assert!(!urls.contains(&"#local-icon"));
    }

    #[test]
    fn test_extract_deduplicates() {
        let html = r#"
            <img src="/logo.png">
            <img src="/logo.png">
            <div style="background: url(/logo.png)"></div>
        "#;
        let refs = extractor().extract_references(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, AssetKind::Image);
    }

    #[test]
    fn test_extract_skips_data_uris() {
        let html = r#"
            <img src="data:image/gif;base64,R0lGOD">
            <div style="background: url(data:image/png;base64,AAAA)"></div>
            <img src="/real.png">
        "#;
        let refs = extractor().extract_references(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "/real.png");
    }

    #[test]
    fn test_extract_lazy_source_attributes() {
        let html = r#"<img data-src="/deferred.png" src="data:image/gif;base64,R0lGOD">"#;
        let refs = extractor().extract_references(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "/deferred.png");
    }

    #[test]
    fn test_extract_css_urls() {
        let css = r#"
            .a { background-image: url('/img/a.png'); }
            .b { background: #fff url("/img/b.png") no-repeat; }
            .c { background: url(data:image/png;base64,AAAA); }
            @font-face { src: url(../fonts/body.woff2) format('woff2'); }
        "#;
        let urls = extractor().extract_css_urls(css);
        assert_eq!(
            urls,
            vec!["/img/a.png", "/img/b.png", "../fonts/body.woff2"]
        );
    }

    #[test]
    fn test_parse_srcset_preserves_descriptors() {
        let entries = parse_srcset("/a.png 1x, /b.png 2x, /c.png");
        assert_eq!(
            entries,
            vec![
                ("/a.png".to_string(), Some("1x".to_string())),
                ("/b.png".to_string(), Some("2x".to_string())),
                ("/c.png".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_classify_css_reference() {
        assert_eq!(
            classify_css_reference("../fonts/a.woff2"),
            Some(AssetKind::Font)
        );
        assert_eq!(
            classify_css_reference("/img/b.png?v=3"),
            Some(AssetKind::Image)
        );
        assert_eq!(classify_css_reference("/misc/config.json"), None);
        assert_eq!(classify_css_reference("no-extension"), None);
    }
}
