use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventLoadingFinished;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::CloneConfig;

/// Upper bound on discrete scroll steps; past this the page is assumed
/// to repeat content indefinitely.
const MAX_SCROLL_STEPS: u32 = 40;

const HOVER_JS: &str = r#"
    (() => {
        const targets = document.querySelectorAll('a, button');
        for (const el of targets) {
            el.dispatchEvent(new MouseEvent('mouseenter', { bubbles: true }));
            el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
        }
        return targets.length;
    })()
"#;

/// One headless Chrome session driving one page. All interaction is
/// strictly sequential; the rest of the pipeline only ever sees the
/// HTML text, CSS text and screenshot this wrapper hands out.
pub struct PageSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    scroll_delay: Duration,
}

impl PageSession {
    pub async fn launch(config: &CloneConfig) -> Result<Self> {
        let window_size = format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        );
        let browser_config = BrowserConfig::builder()
            .viewport(Some(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }))
            .args(vec![
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                window_size.as_str(),
            ])
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch headless browser")?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        page.set_user_agent(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await
            .context("failed to set user agent")?;

        Ok(Self {
            browser,
            page,
            handler_task,
            scroll_delay: config.scroll_delay,
        })
    }

    /// Navigate to the target page. The only fatal failure in a run:
    /// no page within the budget means there is nothing to snapshot.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| anyhow!("navigation to {} timed out after {}s", url, timeout.as_secs()))?
            .with_context(|| format!("failed to navigate to {}", url))?;
        Ok(())
    }

    /// Fixed delay for the page's own scripts to run before extraction.
    pub async fn settle(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Bounded sequence of trigger actions for content the page defers
    /// until it scrolls into view or is hovered, followed by a single
    /// network-idle wait. A timeout here is not an error; extraction
    /// proceeds with whatever rendered.
    pub async fn trigger_lazy_content(
        &self,
        idle_timeout: Duration,
        idle_window: Duration,
    ) -> Result<()> {
        let scroll_height = self
            .page
            .evaluate("Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)")
            .await
            .context("failed to read scroll height")?
            .into_value::<f64>()
            .unwrap_or(0.0);
        let viewport_height = self
            .page
            .evaluate("window.innerHeight")
            .await
            .context("failed to read viewport height")?
            .into_value::<f64>()
            .unwrap_or(0.0);

        let step = (viewport_height / 3.0).max(200.0);
        let mut position = 0.0;
        let mut steps = 0;
        while position < scroll_height && steps < MAX_SCROLL_STEPS {
            let script = format!("window.scrollTo(0, {})", position);
            self.page.evaluate(script.as_str()).await.ok();
            tokio::time::sleep(self.scroll_delay).await;
            position += step;
            steps += 1;
        }
        let script = format!("window.scrollTo(0, {})", scroll_height);
        self.page.evaluate(script.as_str()).await.ok();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        self.page.evaluate("window.scrollTo(0, 0)").await.ok();
        tokio::time::sleep(Duration::from_millis(500)).await;

        self.page.evaluate(HOVER_JS).await.ok();

        self.wait_for_network_idle(idle_timeout, idle_window).await
    }

    /// Wait until no request finishes for one idle window, or until the
    /// deadline passes, whichever comes first.
    async fn wait_for_network_idle(
        &self,
        idle_timeout: Duration,
        idle_window: Duration,
    ) -> Result<()> {
        let mut events = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to subscribe to network events")?;
        let deadline = Instant::now() + idle_timeout;
        loop {
            let window = tokio::time::sleep(idle_window);
            tokio::pin!(window);
            tokio::select! {
                _ = &mut window => break,
                event = events.next() => {
                    if event.is_none() || Instant::now() >= deadline {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialized state of the rendered DOM.
    pub async fn html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("failed to serialize page content")
    }

    pub async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await
            .context("failed to capture screenshot")?;
        Ok(())
    }

    /// Tear the session down. Called on success and failure paths alike.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed.context("failed to close browser")?;
        Ok(())
    }
}
