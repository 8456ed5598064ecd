//! Extracted-text cache for attachment files.
//!
//! The cache is the pipeline's only persisted state: once an attachment's
//! text has been extracted, subsequent runs skip both download and extraction.
//! The on-disk implementation stores a `<filename>.extracted.txt` sibling next
//! to each attachment; tests substitute the in-memory implementation.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Cache of extracted attachment text, keyed by the attachment file path.
pub trait TextCache: Send + Sync {
    /// Look up cached text for an attachment. A hit must short-circuit all
    /// extraction work.
    fn get(&self, file_path: &Path) -> Option<String>;

    /// Store extracted text for an attachment.
    fn put(&self, file_path: &Path, text: &str) -> Result<()>;
}

/// Filesystem cache storing `<filename>.extracted.txt` next to the attachment.
/// The layout must stay byte-compatible across runs for cache hits to work.
#[derive(Debug, Default)]
pub struct FsTextCache;

impl FsTextCache {
    pub fn new() -> Self {
        Self
    }

    /// Sibling cache path for an attachment file.
    pub fn cache_path(file_path: &Path) -> PathBuf {
        let mut name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".extracted.txt");
        file_path.with_file_name(name)
    }
}

impl TextCache for FsTextCache {
    fn get(&self, file_path: &Path) -> Option<String> {
        let path = Self::cache_path(file_path);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Cache hit for {}", file_path.display());
                Some(text)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read cached text {}: {}", path.display(), e);
                None
            }
        }
    }

    fn put(&self, file_path: &Path, text: &str) -> Result<()> {
        let path = Self::cache_path(file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write text cache: {}", path.display()))?;
        debug!("Cached {} chars to {}", text.len(), path.display());
        Ok(())
    }
}

/// In-memory cache for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTextCache {
    entries: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextCache for MemoryTextCache {
    fn get(&self, file_path: &Path) -> Option<String> {
        self.entries.lock().unwrap().get(file_path).cloned()
    }

    fn put(&self, file_path: &Path, text: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(file_path.to_path_buf(), text.to_string());
        Ok(())
    }
}
