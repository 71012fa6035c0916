use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Result;

/// Runtime settings for a [`SearchManager`](super::SearchManager).
///
/// Every field has a default, so a config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Where per-folder change-detection metadata is persisted
    pub cache_dir: PathBuf,
    /// Maximum number of index hits considered per query
    pub result_limit: usize,
    /// Line previews kept per file (the match count is never capped)
    pub max_previews: usize,
    /// Characters of context on each side of a match in a preview
    pub preview_context: usize,
    /// Memory budget handed to the tantivy writer
    pub writer_heap_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            result_limit: 1000,
            max_previews: 5,
            preview_context: 40,
            writer_heap_bytes: 50_000_000,
        }
    }
}

impl SearchConfig {
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        log::info!("[SearchConfig] Loaded config from {:?}", path);
        Ok(config)
    }
}

/// Local (non-synced) data directory for persisted metadata
pub fn default_cache_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(local_app_data) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local_app_data)
                .join("mdkb-search")
                .join("stats");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("mdkb-search")
                .join("stats");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("mdkb-search")
                .join("stats");
        }
    }

    std::env::temp_dir().join("mdkb-search-cache")
}
