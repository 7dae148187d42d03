use anyhow::{Context, Result};
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{local_name, namespace_url, ns, parse_document, Attribute, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use url::Url;

use crate::extractor;
use crate::resolver::{self, Resolution};
use crate::store::MappingStore;

const CSS_URL_PATTERN: &str = r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#;

/// Attributes whose handlers only exist in the original page's runtime.
const DEAD_HANDLER_ATTRIBUTES: [&str; 2] = ["onload", "onerror"];

/// What the rewrite pass stripped, for the run report.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteSummary {
    pub lazy_markers_removed: usize,
    pub placeholders_removed: usize,
    pub handlers_removed: usize,
}

/// Rewrites every reference site in HTML and CSS to the local path the
/// mapping store recorded, leaving failed downloads pointing at their
/// remote URL. Runs only after all fetch attempts have completed, so the
/// store is stable for the whole pass. Applying the pass to its own
/// output is a no-op: rewritten local paths match no store key.
pub struct PathRewriter {
    base_url: Url,
    store: Arc<MappingStore>,
    css_url: Regex,
}

impl PathRewriter {
    pub fn new(base_url: Url, store: Arc<MappingStore>) -> Result<Self> {
        let css_url = Regex::new(CSS_URL_PATTERN).context("failed to compile url() pattern")?;
        Ok(Self {
            base_url,
            store,
            css_url,
        })
    }

    /// Rewrite a rendered HTML document. The document is parsed into a
    /// tree and every swap is scoped to the exact attribute of the exact
    /// node, so no unrelated text can be caught by a match.
    pub fn rewrite_html(&self, html: &str) -> Result<(String, RewriteSummary)> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .context("failed to parse HTML document")?;

        let mut summary = RewriteSummary::default();
        self.walk(&dom.document, &mut summary);

        let mut out = Vec::new();
        let document: SerializableHandle = dom.document.clone().into();
        serialize(&mut out, &document, SerializeOpts::default())
            .context("failed to serialize rewritten document")?;
        let rewritten = String::from_utf8(out).context("rewritten document is not valid UTF-8")?;
        Ok((rewritten, summary))
    }

    fn walk(&self, handle: &Handle, summary: &mut RewriteSummary) {
        if let NodeData::Element { name, attrs, .. } = &handle.data {
            // Placeholder <source data-empty> children carry an inert
            // payload that would shadow the real image offline.
            {
                let mut children = handle.children.borrow_mut();
                let before = children.len();
                children.retain(|child| !is_placeholder_source(child));
                summary.placeholders_removed += before - children.len();
            }

            let mut attrs = attrs.borrow_mut();
            match name.local.as_ref() {
                "img" => {
                    self.swap_url_attr(&mut attrs, "src");
                    self.swap_srcset_attr(&mut attrs);
                    self.promote_lazy_source(&mut attrs);
                }
                "source" => {
                    self.swap_url_attr(&mut attrs, "src");
                    self.swap_srcset_attr(&mut attrs);
                }
                "script" => self.swap_url_attr(&mut attrs, "src"),
                "link" => {
                    let is_stylesheet = attrs.iter().any(|a| {
                        a.name.local.as_ref() == "rel" && a.value.contains("stylesheet")
                    });
                    if is_stylesheet {
                        self.swap_url_attr(&mut attrs, "href");
                    }
                }
                "video" => self.swap_url_attr(&mut attrs, "poster"),
                "use" => self.swap_url_attr(&mut attrs, "href"),
                _ => {}
            }

            // Inline styles resolve against the page URL; local paths in
            // the output root need no directory hop.
            for attr in attrs
                .iter_mut()
                .filter(|a| a.name.local.as_ref() == "style")
            {
                if attr.value.contains("background") {
                    let rewritten = self.rewrite_css(&attr.value, &self.base_url, Path::new(""));
                    attr.value = StrTendril::from(rewritten.as_str());
                }
            }

            let before = attrs.len();
            attrs.retain(|a| a.name.local.as_ref() != "data-lazy");
            summary.lazy_markers_removed += before - attrs.len();

            let before = attrs.len();
            attrs.retain(|a| !DEAD_HANDLER_ATTRIBUTES.contains(&a.name.local.as_ref()));
            summary.handlers_removed += before - attrs.len();
        }

        let children: Vec<Handle> = handle.children.borrow().iter().cloned().collect();
        for child in &children {
            self.walk(child, summary);
        }
    }

    fn swap_url_attr(&self, attrs: &mut [Attribute], attr_name: &str) {
        for attr in attrs
            .iter_mut()
            .filter(|a| a.name.local.as_ref() == attr_name)
        {
            if let Some(local) = self.map_reference(&attr.value) {
                attr.value = StrTendril::from(local.as_str());
            }
        }
    }

    /// Hydrate an image whose real URL only lives in a lazy-load data
    /// attribute: with no script runtime offline, the downloaded copy
    /// must be promoted into `src` or the image never displays.
    fn promote_lazy_source(&self, attrs: &mut Vec<Attribute>) {
        let mapped = extractor::LAZY_SOURCE_ATTRIBUTES.iter().find_map(|name| {
            attrs
                .iter()
                .find(|a| a.name.local.as_ref() == *name)
                .and_then(|a| self.map_reference(&a.value))
        });
        let Some(local) = mapped else {
            return;
        };

        let placeholder_src = attrs
            .iter()
            .find(|a| a.name.local.as_ref() == "src")
            .map(|a| a.value.trim().is_empty() || a.value.starts_with("data:"))
            .unwrap_or(true);
        if placeholder_src {
            match attrs.iter_mut().find(|a| a.name.local.as_ref() == "src") {
                Some(src) => src.value = StrTendril::from(local.as_str()),
                None => attrs.push(Attribute {
                    name: QualName::new(None, ns!(), local_name!("src")),
                    value: StrTendril::from(local.as_str()),
                }),
            }
        }
        attrs.retain(|a| {
            !extractor::LAZY_SOURCE_ATTRIBUTES.contains(&a.name.local.as_ref())
        });
    }

    fn swap_srcset_attr(&self, attrs: &mut [Attribute]) {
        for attr in attrs
            .iter_mut()
            .filter(|a| a.name.local.as_ref() == "srcset")
        {
            let rewritten = self.rewrite_srcset(&attr.value);
            attr.value = StrTendril::from(rewritten.as_str());
        }
    }

    /// Rewrite each URL token of a srcset value, keeping density and
    /// width descriptors verbatim.
    pub fn rewrite_srcset(&self, srcset: &str) -> String {
        extractor::parse_srcset(srcset)
            .into_iter()
            .map(|(url, descriptor)| {
                let target = self.map_reference(&url).unwrap_or(url);
                match descriptor {
                    Some(descriptor) => format!("{} {}", target, descriptor),
                    None => target,
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Rewrite stylesheet text against the stylesheet's own URL, with
    /// local paths expressed relative to the directory the CSS file lives
    /// in (one hop up from css/ into assets/ for the usual layout).
    pub fn rewrite_css(&self, css: &str, css_url: &Url, css_dir: &Path) -> String {
        self.css_url
            .replace_all(css, |caps: &regex::Captures<'_>| {
                let raw = caps[1].trim();
                match self.map_css_reference(raw, css_url, css_dir) {
                    Some(local) => format!("url({})", local),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Local path for a reference found in HTML, or `None` when the
    /// asset was not downloaded and the site must keep its remote URL.
    fn map_reference(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") {
            return None;
        }
        match resolver::resolve(raw, &self.base_url) {
            Resolution::Canonical(url) => self
                .store
                .local_path_for(url.as_str())
                .or_else(|| self.store.local_path_for(raw)),
            Resolution::Skip => self.store.local_path_for(raw),
        }
    }

    fn map_css_reference(&self, raw: &str, css_url: &Url, css_dir: &Path) -> Option<String> {
        if raw.is_empty() || raw.starts_with("data:") {
            return None;
        }
        let local = match resolver::resolve(raw, css_url) {
            Resolution::Canonical(url) => self
                .store
                .local_path_for(url.as_str())
                .or_else(|| self.store.local_path_for(raw))?,
            Resolution::Skip => self.store.local_path_for(raw)?,
        };
        let relative = pathdiff::diff_paths(Path::new(&local), css_dir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(local);
        Some(relative)
    }
}

fn is_placeholder_source(handle: &Handle) -> bool {
    match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            name.local.as_ref() == "source"
                && attrs
                    .borrow()
                    .iter()
                    .any(|a| a.name.local.as_ref() == "data-empty")
        }
        _ => false,
    }
}
