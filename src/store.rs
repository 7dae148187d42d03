use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Terminal outcome of a fetch attempt for one canonical URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Downloaded,
    Failed,
}

/// Recorded outcome for one asset. Keyed in the store under both the
/// reference string as written in the source and its canonical absolute
/// form, so lookups from either spelling land on the same entry.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub canonical_url: String,
    /// Path relative to the output root; empty when the download failed.
    pub local_path: String,
    pub status: AssetStatus,
}

/// Result of claiming a canonical URL for download.
pub enum Claim {
    /// The caller owns the network attempt and must record the outcome.
    Owner,
    /// Another task is fetching the same URL; wait on the notify, then
    /// claim again.
    InFlight(Arc<Notify>),
    /// Outcome already recorded in this run.
    Resolved(MappingEntry),
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, MappingEntry>,
    in_flight: HashMap<String, Arc<Notify>>,
    reserved_paths: HashSet<String>,
    synth_counter: u64,
}

/// Shared URL-to-local-path mapping for one snapshot run. Constructed per
/// run and passed by `Arc` to the fetcher and rewriter; the claim/record
/// protocol guarantees at most one network attempt per canonical URL.
#[derive(Default)]
pub struct MappingStore {
    inner: Mutex<StoreInner>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a canonical URL for fetching. Exactly one caller gets
    /// `Owner`; concurrent callers get `InFlight` until the owner records
    /// an outcome, after which everyone sees `Resolved`.
    pub fn claim(&self, canonical: &str) -> Claim {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get(canonical) {
            return Claim::Resolved(entry.clone());
        }
        if let Some(notify) = inner.in_flight.get(canonical) {
            return Claim::InFlight(notify.clone());
        }
        inner
            .in_flight
            .insert(canonical.to_string(), Arc::new(Notify::new()));
        Claim::Owner
    }

    pub fn record_success(&self, original: &str, canonical: &str, local_path: &str) {
        let entry = MappingEntry {
            canonical_url: canonical.to_string(),
            local_path: local_path.to_string(),
            status: AssetStatus::Downloaded,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(canonical.to_string(), entry.clone());
        // The same relative spelling can occur under two bases; the
        // canonical key stays authoritative, first spelling wins here.
        inner
            .entries
            .entry(original.to_string())
            .or_insert(entry);
        if let Some(notify) = inner.in_flight.remove(canonical) {
            notify.notify_waiters();
        }
    }

    pub fn record_failure(&self, original: &str, canonical: &str) {
        let entry = MappingEntry {
            canonical_url: canonical.to_string(),
            local_path: String::new(),
            status: AssetStatus::Failed,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(canonical.to_string(), entry.clone());
        inner
            .entries
            .entry(original.to_string())
            .or_insert(entry);
        if let Some(notify) = inner.in_flight.remove(canonical) {
            notify.notify_waiters();
        }
    }

    /// Exact-string lookup under either key form.
    pub fn lookup(&self, reference: &str) -> Option<MappingEntry> {
        self.inner.lock().unwrap().entries.get(reference).cloned()
    }

    /// Local path for a reference, only when the download succeeded.
    pub fn local_path_for(&self, reference: &str) -> Option<String> {
        self.lookup(reference).and_then(|entry| match entry.status {
            AssetStatus::Downloaded => Some(entry.local_path),
            AssetStatus::Failed => None,
        })
    }

    /// Reserve a unique local path inside `folder`. An empty filename gets
    /// a synthesized one; a taken filename gets a numeric suffix before
    /// the extension rather than overwriting the earlier asset.
    pub fn reserve_path(&self, folder: &str, filename: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        let filename = if filename.is_empty() {
            inner.synth_counter += 1;
            format!("file-{}", inner.synth_counter)
        } else {
            filename.to_string()
        };

        let candidate = format!("{}/{}", folder, filename);
        if inner.reserved_paths.insert(candidate.clone()) {
            return candidate;
        }

        let (stem, ext) = match filename.rfind('.') {
            Some(idx) if idx > 0 => filename.split_at(idx),
            _ => (filename.as_str(), ""),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{}/{}-{}{}", folder, stem, n, ext);
            if inner.reserved_paths.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
