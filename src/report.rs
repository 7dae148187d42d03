use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CloneConfig;
use crate::extractor::AssetKind;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClassStats {
    pub total: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Counters for everything a run touched. Class totals grow at enqueue
/// time, download/failure counts at completion; the fix counters come
/// from the rewrite pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloneStats {
    pub images: ClassStats,
    pub stylesheets: ClassStats,
    pub scripts: ClassStats,
    pub fonts: ClassStats,
    pub lazy_markers_removed: usize,
    pub placeholders_removed: usize,
    pub handlers_removed: usize,
}

impl CloneStats {
    /// svg `use` references are downloaded and reported as images.
    pub fn class_mut(&mut self, kind: AssetKind) -> &mut ClassStats {
        match kind {
            AssetKind::Image | AssetKind::SvgUse => &mut self.images,
            AssetKind::Stylesheet => &mut self.stylesheets,
            AssetKind::Script => &mut self.scripts,
            AssetKind::Font => &mut self.fonts,
        }
    }

    fn classes(&self) -> [&ClassStats; 4] {
        [&self.images, &self.stylesheets, &self.scripts, &self.fonts]
    }

    pub fn total_assets(&self) -> usize {
        self.classes().iter().map(|c| c.total).sum()
    }

    pub fn total_downloaded(&self) -> usize {
        self.classes().iter().map(|c| c.downloaded).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.classes().iter().map(|c| c.failed).sum()
    }
}

/// Summary persisted as `clone-report.json` next to the rewritten page.
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub version: String,
    pub timestamp: String,
    pub target_url: String,
    pub output_file: String,
    pub stats: CloneStats,
    pub total_assets: usize,
    pub downloaded_assets: usize,
    pub failed_assets: usize,
}

impl CloneReport {
    pub fn build(config: &CloneConfig, stats: CloneStats) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: config.target_url.clone(),
            output_file: config.output_file.clone(),
            total_assets: stats.total_assets(),
            downloaded_assets: stats.total_downloaded(),
            failed_assets: stats.total_failed(),
            stats,
        }
    }

    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join("clone-report.json");
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        fs::write(&path, json).with_context(|| format!("failed to write report: {:?}", path))?;
        Ok(path)
    }

    pub fn print_summary(&self) {
        println!("\n📊 {}", "Clone report".bold());
        print_class("Images", &self.stats.images);
        print_class("CSS", &self.stats.stylesheets);
        print_class("JavaScript", &self.stats.scripts);
        print_class("Fonts", &self.stats.fonts);
        println!(
            "   Lazy markers removed: {}, placeholders removed: {}, handlers removed: {}",
            self.stats.lazy_markers_removed,
            self.stats.placeholders_removed,
            self.stats.handlers_removed
        );
        println!(
            "   Total: {}/{} assets downloaded",
            self.downloaded_assets.to_string().green(),
            self.total_assets
        );
    }
}

fn print_class(label: &str, stats: &ClassStats) {
    let failed = if stats.failed > 0 {
        format!(" ({} failed)", stats.failed).red().to_string()
    } else {
        String::new()
    };
    println!(
        "   {:<12} {}/{} downloaded{}",
        label, stats.downloaded, stats.total, failed
    );
}
