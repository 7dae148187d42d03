use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CloneConfig, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(
    name = "page-snap",
    about = "Capture a self-contained offline snapshot of a fully-rendered web page",
    version,
    long_about = "Renders a page in a headless browser, downloads every referenced asset (images, stylesheets, scripts, fonts), and rewrites the page so it displays identically when opened from local disk."
)]
pub struct CloneCommand {
    /// The URL of the page to snapshot
    #[arg(required = true)]
    pub url: String,

    /// File name for the rewritten HTML inside the output directory
    #[arg(default_value = "index.html")]
    pub output_file: String,

    /// Output directory for the snapshot
    #[arg(default_value = ".")]
    pub output_dir: PathBuf,

    /// Browser viewport width in pixels
    #[arg(long, default_value = "1920")]
    pub viewport_width: u32,

    /// Browser viewport height in pixels
    #[arg(long, default_value = "1080")]
    pub viewport_height: u32,

    /// User agent string for navigation and asset requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Page navigation timeout in seconds (exceeding it aborts the run)
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Delay in seconds after navigation before extraction begins
    #[arg(long, default_value = "12")]
    pub settle: u64,

    /// Per-request timeout for asset downloads in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout: u64,

    /// Maximum concurrent asset downloads
    #[arg(short = 'c', long, default_value = "8")]
    pub max_concurrent: usize,
}

impl CloneCommand {
    pub fn into_config(self) -> CloneConfig {
        let mut config = CloneConfig::new(&self.url, &self.output_file, &self.output_dir);
        config.viewport_width = self.viewport_width;
        config.viewport_height = self.viewport_height;
        config.user_agent = self.user_agent;
        config.navigation_timeout = Duration::from_secs(self.timeout);
        config.settle_delay = Duration::from_secs(self.settle);
        config.request_timeout = Duration::from_secs(self.request_timeout);
        config.max_concurrent = self.max_concurrent.max(1);
        config
    }
}
