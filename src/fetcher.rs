use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::REFERER;
use reqwest::{Client, ClientBuilder};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::CloneConfig;
use crate::extractor::{AssetReference, FONT_EXTENSIONS};
use crate::layout::OutputLayout;
use crate::report::CloneStats;
use crate::resolver::{self, Resolution};
use crate::store::{AssetStatus, Claim, MappingStore};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Downloads assets with bounded concurrency, retry/backoff, and
/// at-most-once network cost per canonical URL via the mapping store.
pub struct AssetFetcher {
    client: Client,
    layout: OutputLayout,
    referer: String,
    store: Arc<MappingStore>,
    stats: Arc<Mutex<CloneStats>>,
    semaphore: Arc<Semaphore>,
}

impl AssetFetcher {
    pub fn new(
        config: &CloneConfig,
        layout: OutputLayout,
        store: Arc<MappingStore>,
        stats: Arc<Mutex<CloneStats>>,
    ) -> Result<Self> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            layout,
            referer: config.target_url.clone(),
            store,
            stats,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    /// Fetch one reference resolved against `base`. Returns the local
    /// path on success, `None` for references that are never fetched
    /// (`data:` URIs, unparsable strings), and an error once all retries
    /// are exhausted. Errors are local to the asset, never fatal.
    pub async fn fetch(&self, reference: &str, base: &Url) -> Result<Option<String>> {
        let canonical = match resolver::resolve(reference, base) {
            Resolution::Canonical(url) => url,
            Resolution::Skip => {
                if !reference.starts_with("data:") {
                    eprintln!("⏭️  Skipping unfetchable reference: {}", reference);
                }
                return Ok(None);
            }
        };

        loop {
            match self.store.claim(canonical.as_str()) {
                Claim::Resolved(entry) => {
                    return match entry.status {
                        AssetStatus::Downloaded => Ok(Some(entry.local_path)),
                        AssetStatus::Failed => {
                            Err(anyhow!("download previously failed for {}", canonical))
                        }
                    };
                }
                Claim::InFlight(notify) => {
                    // Register before re-checking so a wakeup between the
                    // check and the await cannot be missed.
                    let notified = notify.notified();
                    if self.store.lookup(canonical.as_str()).is_none() {
                        notified.await;
                    }
                }
                Claim::Owner => {
                    return match self.download(&canonical).await {
                        Ok(local_path) => {
                            self.store
                                .record_success(reference, canonical.as_str(), &local_path);
                            Ok(Some(local_path))
                        }
                        Err(err) => {
                            self.store.record_failure(reference, canonical.as_str());
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Fetch a batch of same-phase references against one base URL,
    /// updating per-class statistics: totals at enqueue time, download
    /// and failure counts at completion.
    pub async fn fetch_class(&self, refs: &[AssetReference], base: &Url, label: &str) {
        if refs.is_empty() {
            return;
        }
        {
            let mut stats = self.stats.lock().unwrap();
            for reference in refs {
                stats.class_mut(reference.kind).total += 1;
            }
        }

        let bar = ProgressBar::new(refs.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:30}] {pos}/{len}")
                .unwrap()
                .progress_chars("█░ "),
        );
        bar.set_message(label.to_string());

        let tasks = refs.iter().map(|reference| {
            let bar = bar.clone();
            async move {
                let outcome = self.fetch(&reference.url, base).await;
                {
                    let mut stats = self.stats.lock().unwrap();
                    match &outcome {
                        Ok(Some(_)) => stats.class_mut(reference.kind).downloaded += 1,
                        Ok(None) => {}
                        Err(_) => stats.class_mut(reference.kind).failed += 1,
                    }
                }
                if let Err(err) = &outcome {
                    bar.println(format!("⚠️  {}: {:#}", reference.url, err));
                }
                bar.inc(1);
            }
        });
        futures::future::join_all(tasks).await;
        bar.finish_and_clear();
    }

    async fn download(&self, canonical: &Url) -> Result<String> {
        let _permit = self.semaphore.acquire().await?;

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(canonical).await {
                Ok((bytes, content_type)) => {
                    let local_path = self.place(canonical, content_type.as_deref());
                    self.layout.save(&local_path, &bytes)?;
                    return Ok(local_path);
                }
                Err(err) => {
                    last_error = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(
                            RETRY_BASE_DELAY_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("download failed: {}", canonical)))
    }

    async fn attempt(&self, canonical: &Url) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .client
            .get(canonical.clone())
            .header(REFERER, self.referer.clone())
            .send()
            .await
            .with_context(|| format!("request failed for {}", canonical))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {} for {}", status, canonical));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body for {}", canonical))?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Derive and reserve the local path for a downloaded asset.
    fn place(&self, canonical: &Url, content_type: Option<&str>) -> String {
        let mut filename = filename_from_url(canonical);
        if !filename.is_empty() && Path::new(&filename).extension().is_none() {
            if let Some(ext) = extension_for_content_type(content_type) {
                filename = format!("{}.{}", filename, ext);
            }
        }
        self.store
            .reserve_path(asset_folder(canonical), &filename)
    }
}

/// Folder by URL extension; unknown or missing extensions land in assets.
pub fn asset_folder(url: &Url) -> &'static str {
    let ext = Path::new(url.path())
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "css" => "css",
        "js" => "js",
        ext if FONT_EXTENSIONS.contains(&ext) => "fonts",
        _ => "assets",
    }
}

/// Last path segment of the URL, reduced to a filesystem-safe character
/// set. May be empty (e.g. for a bare origin); the store synthesizes a
/// name in that case.
pub fn filename_from_url(url: &Url) -> String {
    Path::new(url.path())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_for_content_type(content_type: Option<&str>) -> Option<&'static str> {
    let mime = content_type?;
    mime_guess::get_mime_extensions_str(mime)?.first().copied()
}
