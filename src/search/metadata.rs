use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::changes::FileStat;
use super::error::Result;

/// Persists change-detection metadata, one JSON file per folder.
///
/// Files are named by the md5 of the folder path, so the same folder maps to the
/// same file across runs. Failures never reach the caller: a failed load looks
/// like "no metadata", a failed save is logged and skipped.
pub struct MetadataStore {
    cache_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            log::warn!(
                "[MetadataStore] Could not create cache dir {:?} (saves will be skipped): {}",
                cache_dir,
                e
            );
        }
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn folder_hash(folder: &Path) -> String {
        format!("{:x}", md5::compute(folder.to_string_lossy().as_bytes()))
    }

    pub fn stats_path(&self, folder: &Path) -> PathBuf {
        self.cache_dir
            .join(format!("stats-{}.json", Self::folder_hash(folder)))
    }

    /// Overwrite the folder's file with `stats`. Returns whether it was written.
    pub async fn save(&self, folder: &Path, stats: &BTreeMap<PathBuf, FileStat>) -> bool {
        match self.try_save(folder, stats).await {
            Ok(()) => {
                log::debug!(
                    "[MetadataStore] Saved {} file stats for {:?}",
                    stats.len(),
                    folder
                );
                true
            }
            Err(e) => {
                log::warn!("[MetadataStore] Error saving file stats for {:?}: {}", folder, e);
                false
            }
        }
    }

    /// Read the folder's file. Missing or unreadable files yield an empty map.
    pub async fn load(&self, folder: &Path) -> BTreeMap<PathBuf, FileStat> {
        match self.try_load(folder).await {
            Ok(Some(stats)) => {
                log::debug!(
                    "[MetadataStore] Loaded {} file stats for {:?}",
                    stats.len(),
                    folder
                );
                stats
            }
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                log::warn!("[MetadataStore] Error loading file stats for {:?}: {}", folder, e);
                BTreeMap::new()
            }
        }
    }

    async fn try_save(&self, folder: &Path, stats: &BTreeMap<PathBuf, FileStat>) -> Result<()> {
        let persisted: BTreeMap<String, FileStat> = stats
            .iter()
            .map(|(path, stat)| (path.to_string_lossy().to_string(), *stat))
            .collect();
        let content = serde_json::to_string_pretty(&persisted)?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let stats_path = self.stats_path(folder);
        // Replaced atomically via a temp file and rename
        let temp_path = stats_path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &stats_path).await?;
        Ok(())
    }

    async fn try_load(&self, folder: &Path) -> Result<Option<BTreeMap<PathBuf, FileStat>>> {
        let stats_path = self.stats_path(folder);
        let content = match tokio::fs::read_to_string(&stats_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let persisted: BTreeMap<String, FileStat> = serde_json::from_str(&content)?;
        Ok(Some(
            persisted
                .into_iter()
                .map(|(path, stat)| (PathBuf::from(path), stat))
                .collect(),
        ))
    }
}
