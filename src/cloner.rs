use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::browser::PageSession;
use crate::config::CloneConfig;
use crate::extractor::{self, AssetKind, AssetReference, ReferenceExtractor};
use crate::fetcher::AssetFetcher;
use crate::layout::OutputLayout;
use crate::report::{CloneReport, CloneStats};
use crate::resolver::{self, Resolution};
use crate::rewriter::PathRewriter;
use crate::store::MappingStore;

/// Drives one snapshot run: collect references from the rendered page,
/// fetch everything, then rewrite, strictly in that order so the mapping
/// store is complete and stable before the first rewrite.
pub struct PageCloner {
    config: CloneConfig,
    layout: OutputLayout,
    store: Arc<MappingStore>,
    stats: Arc<Mutex<CloneStats>>,
    extractor: ReferenceExtractor,
    fetcher: AssetFetcher,
}

impl PageCloner {
    pub fn new(config: CloneConfig) -> Result<Self> {
        let layout = OutputLayout::create(&config.output_dir)?;
        let store = Arc::new(MappingStore::new());
        let stats = Arc::new(Mutex::new(CloneStats::default()));
        let extractor = ReferenceExtractor::new()?;
        let fetcher = AssetFetcher::new(&config, layout.clone(), store.clone(), stats.clone())?;
        Ok(Self {
            config,
            layout,
            store,
            stats,
            extractor,
            fetcher,
        })
    }

    pub async fn run(&self) -> Result<CloneReport> {
        println!(
            "🚀 Starting page snapshot for: {}",
            self.config.target_url.blue()
        );
        println!("📁 Output directory: {:?}", self.config.output_dir);
        println!(
            "🖥️  Viewport: {}x{}",
            self.config.viewport_width, self.config.viewport_height
        );

        let session = PageSession::launch(&self.config).await?;
        let captured = self.capture(&session).await;
        // The session is released on every exit path, including fatal
        // navigation failure.
        if let Err(err) = session.close().await {
            eprintln!("⚠️  Browser did not shut down cleanly: {:#}", err);
        }
        captured
    }

    async fn capture(&self, session: &PageSession) -> Result<CloneReport> {
        session
            .navigate(&self.config.target_url, self.config.navigation_timeout)
            .await?;
        println!("✅ Page loaded");

        println!(
            "⏳ Waiting {}s for scripts to settle...",
            self.config.settle_delay.as_secs()
        );
        session.settle(self.config.settle_delay).await;

        if let Err(err) = session
            .trigger_lazy_content(self.config.idle_timeout, self.config.idle_window)
            .await
        {
            eprintln!("⚠️  Could not trigger lazy content: {:#}", err);
        }

        let html = session.html().await?;
        let base = Url::parse(&self.config.target_url)
            .with_context(|| format!("invalid target URL: {}", self.config.target_url))?;

        let refs = self.extractor.extract_references(&html);
        let mut stylesheets = Vec::new();
        let mut scripts = Vec::new();
        let mut images = Vec::new();
        for reference in refs {
            match reference.kind {
                AssetKind::Stylesheet => stylesheets.push(reference),
                AssetKind::Script => scripts.push(reference),
                AssetKind::Image | AssetKind::SvgUse | AssetKind::Font => images.push(reference),
            }
        }
        println!(
            "🔍 Found {} stylesheets, {} scripts, {} images",
            stylesheets.len(),
            scripts.len(),
            images.len()
        );

        // Stylesheets first: their text feeds the nested extraction pass.
        self.fetcher
            .fetch_class(&stylesheets, &base, "Downloading CSS")
            .await;
        let downloaded_css = self.process_stylesheets(&stylesheets, &base).await?;

        self.fetcher
            .fetch_class(&images, &base, "Downloading images")
            .await;
        self.fetcher
            .fetch_class(&scripts, &base, "Downloading JS")
            .await;

        let rewriter = PathRewriter::new(base.clone(), self.store.clone())?;
        let (output_html, summary) = rewriter.rewrite_html(&html)?;
        {
            let mut stats = self.stats.lock().unwrap();
            stats.lazy_markers_removed += summary.lazy_markers_removed;
            stats.placeholders_removed += summary.placeholders_removed;
            stats.handlers_removed += summary.handlers_removed;
        }
        let html_path = self.layout.root().join(&self.config.output_file);
        fs::write(&html_path, output_html)
            .with_context(|| format!("failed to write HTML: {:?}", html_path))?;
        println!("💾 Saved HTML to {:?}", html_path);

        for (css_url, local) in &downloaded_css {
            let path = self.layout.path_of(local);
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(_) => continue,
            };
            let css_dir = Path::new(local).parent().unwrap_or_else(|| Path::new(""));
            let rewritten = rewriter.rewrite_css(&text, css_url, css_dir);
            if rewritten != text {
                fs::write(&path, rewritten)
                    .with_context(|| format!("failed to rewrite CSS: {:?}", path))?;
            }
        }

        let screenshot_path = self.layout.root().join("screenshot.png");
        match session.screenshot(&screenshot_path).await {
            Ok(()) => println!("📸 Screenshot saved to {:?}", screenshot_path),
            Err(err) => eprintln!("⚠️  Screenshot failed: {:#}", err),
        }

        let stats = self.stats.lock().unwrap().clone();
        let report = CloneReport::build(&self.config, stats);
        let report_path = report.save(self.layout.root())?;
        println!("📄 Report saved to {:?}", report_path);
        report.print_summary();
        Ok(report)
    }

    /// Scan each downloaded stylesheet for nested references (fonts,
    /// background images) and fetch them against the stylesheet's own
    /// URL. One level deep; the store makes the pass idempotent.
    async fn process_stylesheets(
        &self,
        stylesheets: &[AssetReference],
        base: &Url,
    ) -> Result<Vec<(Url, String)>> {
        let mut downloaded = Vec::new();
        for stylesheet in stylesheets {
            let css_url = match resolver::resolve(&stylesheet.url, base) {
                Resolution::Canonical(url) => url,
                Resolution::Skip => continue,
            };
            let local = match self.store.local_path_for(css_url.as_str()) {
                Some(local) => local,
                None => continue,
            };
            let text = match fs::read_to_string(self.layout.path_of(&local)) {
                Ok(text) => text,
                Err(err) => {
                    eprintln!("⚠️  Could not read stylesheet {}: {}", css_url, err);
                    continue;
                }
            };

            let nested: Vec<AssetReference> = self
                .extractor
                .extract_css_urls(&text)
                .into_iter()
                .filter_map(|url| {
                    extractor::classify_css_reference(&url)
                        .map(|kind| AssetReference { url, kind })
                })
                .collect();
            self.fetcher
                .fetch_class(&nested, &css_url, "Downloading CSS assets")
                .await;

            downloaded.push((css_url, local));
        }
        Ok(downloaded)
    }
}
