use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Folders every snapshot gets, one per asset class.
pub const ASSET_FOLDERS: [&str; 4] = ["assets", "css", "js", "fonts"];

/// On-disk layout of one snapshot: the output root plus the per-class
/// asset folders under it. This layout is the contract a browser relies
/// on when the rewritten HTML is opened from disk.
#[derive(Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn create(root: &Path) -> Result<Self> {
        for folder in ASSET_FOLDERS {
            let dir = root.join(folder);
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create output directory: {:?}", dir))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a root-relative location like `assets/logo.png`.
    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn save(&self, relative: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {:?}", parent))?;
        }
        fs::write(&path, content).with_context(|| format!("failed to write file: {:?}", path))?;
        Ok(path)
    }
}
