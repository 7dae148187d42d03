use std::path::PathBuf;
use std::time::Duration;

/// Immutable settings for a single snapshot run. Built once from the CLI
/// arguments and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    pub target_url: String,
    pub output_file: String,
    pub output_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    /// Coarse budget for the initial page navigation; exceeding it is fatal.
    pub navigation_timeout: Duration,
    /// Fixed delay after navigation before extraction begins.
    pub settle_delay: Duration,
    /// Per-request budget for asset downloads, independent of the run timeout.
    pub request_timeout: Duration,
    pub scroll_delay: Duration,
    pub idle_timeout: Duration,
    pub idle_window: Duration,
    pub max_concurrent: usize,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl CloneConfig {
    pub fn new(target_url: &str, output_file: &str, output_dir: &std::path::Path) -> Self {
        Self {
            target_url: target_url.to_string(),
            output_file: output_file.to_string(),
            output_dir: output_dir.to_path_buf(),
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(12),
            request_timeout: Duration::from_secs(30),
            scroll_delay: Duration::from_millis(300),
            idle_timeout: Duration::from_secs(5),
            idle_window: Duration::from_secs(1),
            max_concurrent: 8,
        }
    }
}
