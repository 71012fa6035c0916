pub mod cache;
pub mod changes;
pub mod collector;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod folder_lock;
pub mod metadata;
pub mod preview;
pub mod tokenizer;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

pub use cache::{
    CacheStats, FileRecord, FileTable, FolderStats, IndexCache, IndexCacheEntry, SharedEntry,
    WatchGuard,
};
pub use changes::{ChangeSet, FileStat, FileStats};
pub use collector::MarkdownFile;
pub use config::SearchConfig;
pub use engine::IndexEngine;
pub use error::{ErrorKind, Result, SearchError};
pub use metadata::MetadataStore;
pub use preview::LineMatch;

use folder_lock::FolderLocks;

/// Identifier of a file within one folder's index. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId(pub u64);

impl FileId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Rescan the folder and apply changes before querying a cached index
    pub auto_update: bool,
    /// Drop the cached index and rebuild from scratch
    pub force_refresh: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            auto_update: true,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMatch {
    pub path: PathBuf,
    pub name: String,
    pub relative_path: PathBuf,
    /// First matching lines, capped by `SearchConfig::max_previews`
    pub matches: Vec<LineMatch>,
    /// All matching lines
    pub match_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub results: Vec<FileMatch>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub folder: PathBuf,
    pub file_count: usize,
    /// Difference against the metadata persisted by the previous run
    pub changes_since_last_run: ChangeSet,
    pub elapsed_ms: u64,
}

/// Result of rescanning a folder
struct Scan {
    files: Vec<MarkdownFile>,
    changes: ChangeSet,
}

/// Builds, caches, refreshes and queries per-folder Markdown indexes.
///
/// Build and update work on a folder is serialized by a per-folder lock.
/// Queries run against the cached entry under its read lock, so they see
/// either the state before an incremental update or the state after it.
pub struct SearchManager {
    config: SearchConfig,
    store: MetadataStore,
    /// Recorded fingerprints per indexed folder root. Nested folders keep
    /// separate maps so one folder's rescan never hides a change from another.
    stats: Arc<Mutex<HashMap<PathBuf, FileStats>>>,
    cache: IndexCache,
    locks: FolderLocks,
}

impl SearchManager {
    pub fn new(config: SearchConfig) -> Self {
        let store = MetadataStore::new(config.cache_dir.clone());
        log::info!(
            "[SearchManager] Using metadata cache dir {:?}",
            store.cache_dir()
        );
        Self {
            config,
            store,
            stats: Arc::new(Mutex::new(HashMap::new())),
            cache: IndexCache::default(),
            locks: FolderLocks::default(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.store
    }

    /// Search `folder` for `query`, building or refreshing its index first as
    /// `options` ask. A file is returned only if at least one of its lines
    /// literally contains the query (case-insensitive).
    pub async fn search(
        &self,
        folder: &Path,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResults> {
        validate_folder(folder)?;
        if query.is_empty() {
            return Err(SearchError::InvalidInput("query is required".to_string()));
        }

        let entry = self.prepare(folder, options).await?;
        let entry = entry.read().await;
        let hits = entry.engine.query(query, self.config.result_limit, true)?;
        let results = self.collect_results(&entry.files, &hits, query);

        log::debug!(
            "[SearchManager] Query {:?} in {:?}: {} index hits, {} results",
            query,
            folder,
            hits.len(),
            results.len()
        );
        Ok(SearchResults {
            total: results.len(),
            results,
        })
    }

    /// Full build (collect, index, persist metadata); replaces any cached entry
    pub async fn build_index_for_folder(&self, folder: &Path) -> Result<BuildReport> {
        validate_folder(folder)?;
        let _guard = self.locks.lock(folder).await?;
        Ok(self.build_locked(folder).await?.1)
    }

    /// Invalidate and rebuild from scratch
    pub async fn refresh_index(&self, folder: &Path) -> Result<BuildReport> {
        validate_folder(folder)?;
        let _guard = self.locks.lock(folder).await?;
        log::info!("[SearchManager] Refreshing index for: {:?}", folder);
        self.cache.invalidate(folder)?;
        Ok(self.build_locked(folder).await?.1)
    }

    /// Rescan and apply the delta to the cached index. Builds when nothing is
    /// cached, reporting every file as added.
    pub async fn update_index(&self, folder: &Path) -> Result<ChangeSet> {
        validate_folder(folder)?;
        let _guard = self.locks.lock(folder).await?;
        match self.cache.get(folder)? {
            Some(entry) => self.update_locked(folder, &entry).await,
            None => {
                let (entry, _) = self.build_locked(folder).await?;
                let entry = entry.read().await;
                let mut added: Vec<PathBuf> =
                    entry.files.iter().map(|record| record.path.clone()).collect();
                added.sort();
                Ok(ChangeSet {
                    added,
                    ..ChangeSet::default()
                })
            }
        }
    }

    /// Whether a rescan would change the cached index. Read-only: recorded
    /// stats are left alone. An uncached folder reports `false`.
    pub async fn needs_index_update(&self, folder: &Path) -> Result<bool> {
        validate_folder(folder)?;
        if self.cache.get(folder)?.is_none() {
            return Ok(false);
        }
        let _guard = self.locks.lock(folder).await?;
        let scan = self.scan(folder, false).await?;
        Ok(!scan.changes.is_empty())
    }

    /// Drop the folder's cached index (and watch guard). File stats are kept.
    pub fn clear_index_cache(&self, folder: &Path) -> Result<bool> {
        log::info!("[SearchManager] Clearing index cache for: {:?}", folder);
        self.cache.invalidate(folder)
    }

    pub fn clear_all_cache(&self) -> Result<usize> {
        log::info!("[SearchManager] Clearing all index cache");
        self.cache.invalidate_all()
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    pub fn cached_entry(&self, folder: &Path) -> Result<Option<SharedEntry>> {
        self.cache.get(folder)
    }

    /// Tie a collaborator resource to a cached folder; released on invalidation
    pub fn attach_watch_guard(&self, folder: &Path, guard: WatchGuard) -> Result<bool> {
        self.cache.attach_watch_guard(folder, guard)
    }

    /// Fingerprints recorded by the scans of `folder`
    pub fn file_stats(&self, folder: &Path) -> Result<Vec<(PathBuf, FileStat)>> {
        let stats = self.stats.lock().map_err(SearchError::poisoned)?;
        Ok(stats
            .get(folder)
            .map(|folder_stats| folder_stats.snapshot(folder).into_iter().collect())
            .unwrap_or_default())
    }

    async fn prepare(&self, folder: &Path, options: SearchOptions) -> Result<SharedEntry> {
        if !options.force_refresh && !options.auto_update {
            if let Some(entry) = self.cache.get(folder)? {
                log::debug!("[SearchManager] Using cached index for: {:?}", folder);
                return Ok(entry);
            }
        }

        let _guard = self.locks.lock(folder).await?;
        if options.force_refresh {
            log::info!("[SearchManager] Force refreshing index for: {:?}", folder);
            self.cache.invalidate(folder)?;
            return Ok(self.build_locked(folder).await?.0);
        }

        // Re-check under the lock: a concurrent caller may have built it already
        match self.cache.get(folder)? {
            Some(entry) => {
                if options.auto_update {
                    self.update_locked(folder, &entry).await?;
                }
                Ok(entry)
            }
            None => Ok(self.build_locked(folder).await?.0),
        }
    }

    /// Caller holds the folder lock
    async fn build_locked(&self, folder: &Path) -> Result<(SharedEntry, BuildReport)> {
        let started = Instant::now();
        log::info!("[SearchManager] Building index for folder: {:?}", folder);

        let persisted = self.store.load(folder).await;
        self.stats
            .lock()
            .map_err(SearchError::poisoned)?
            .entry(folder.to_path_buf())
            .or_default()
            .merge(persisted);

        let scan = self.scan(folder, true).await?;
        self.forget_deleted(folder, &scan.changes)?;

        let heap = self.config.writer_heap_bytes;
        let files = scan.files;
        let entry =
            tokio::task::spawn_blocking(move || IndexCacheEntry::build(&files, heap)).await??;
        let file_count = entry.files.len();
        let shared = self.cache.put(folder, entry)?;
        self.persist_stats(folder).await?;

        let report = BuildReport {
            folder: folder.to_path_buf(),
            file_count,
            changes_since_last_run: scan.changes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "[SearchManager] Index built successfully: {} files, {}ms ({} changed since last run)",
            report.file_count,
            report.elapsed_ms,
            report.changes_since_last_run.len()
        );
        Ok((shared, report))
    }

    /// Caller holds the folder lock
    async fn update_locked(&self, folder: &Path, entry: &SharedEntry) -> Result<ChangeSet> {
        let scan = self.scan(folder, true).await?;
        if scan.changes.is_empty() {
            log::debug!("[SearchManager] No changes in {:?}", folder);
            return Ok(scan.changes);
        }

        log::info!(
            "[SearchManager] Incremental update for {:?}: +{} ~{} -{}",
            folder,
            scan.changes.added.len(),
            scan.changes.modified.len(),
            scan.changes.deleted.len()
        );

        // Commit and reader reload block, so the write guard moves to a blocking task
        let mut guard = Arc::clone(entry).write_owned().await;
        let Scan { files, changes } = scan;
        let applied = tokio::task::spawn_blocking(move || {
            let applied = apply_changes(&mut guard, &files, &changes);
            (applied, changes)
        })
        .await;
        let changes = match applied {
            Ok((Ok(()), changes)) => changes,
            Ok((Err(e), _)) => return Err(self.evict_after_failed_update(folder, e)?),
            Err(e) => return Err(self.evict_after_failed_update(folder, e.into())?),
        };

        self.forget_deleted(folder, &changes)?;
        self.persist_stats(folder).await?;

        log::info!("[SearchManager] Incremental update completed for {:?}", folder);
        Ok(changes)
    }

    fn evict_after_failed_update(&self, folder: &Path, e: SearchError) -> Result<SearchError> {
        log::error!(
            "[SearchManager] Incremental update failed for {:?}, evicting cached index: {}",
            folder,
            e
        );
        self.cache.invalidate(folder)?;
        Ok(e)
    }

    fn forget_deleted(&self, folder: &Path, changes: &ChangeSet) -> Result<()> {
        let mut stats = self.stats.lock().map_err(SearchError::poisoned)?;
        if let Some(folder_stats) = stats.get_mut(folder) {
            for path in &changes.deleted {
                folder_stats.remove(path);
            }
        }
        Ok(())
    }

    /// Collect the folder and classify it against recorded stats. With
    /// `record` the observed fingerprints are stored as part of detection.
    async fn scan(&self, folder: &Path, record: bool) -> Result<Scan> {
        let root = folder.to_path_buf();
        let stats = Arc::clone(&self.stats);
        tokio::task::spawn_blocking(move || -> Result<Scan> {
            let files = collector::collect_markdown_files(&root)?;
            let mut stats = stats.lock().map_err(SearchError::poisoned)?;
            let changes = if record {
                let folder_stats = stats.entry(root.clone()).or_default();
                changes::check_folder_changes(folder_stats, &root, &files)
            } else {
                let empty = FileStats::default();
                let folder_stats = stats.get(&root).unwrap_or(&empty);
                changes::peek_folder_changes(folder_stats, &root, &files)
            };
            Ok(Scan { files, changes })
        })
        .await?
    }

    async fn persist_stats(&self, folder: &Path) -> Result<()> {
        let snapshot = self
            .stats
            .lock()
            .map_err(SearchError::poisoned)?
            .get(folder)
            .map(|folder_stats| folder_stats.snapshot(folder))
            .unwrap_or_default();
        self.store.save(folder, &snapshot).await;
        Ok(())
    }

    fn collect_results(&self, files: &FileTable, hits: &[FileId], query: &str) -> Vec<FileMatch> {
        let mut seen = HashSet::new();
        hits.iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| files.get(*id))
            .filter_map(|record| {
                let (matches, match_count) = preview::collect_line_matches(
                    &record.lines,
                    query,
                    self.config.max_previews,
                    self.config.preview_context,
                );
                (match_count > 0).then(|| FileMatch {
                    path: record.path.clone(),
                    name: record.name.clone(),
                    relative_path: record.relative_path.clone(),
                    matches,
                    match_count,
                })
            })
            .collect()
    }
}

fn apply_changes(
    entry: &mut IndexCacheEntry,
    files: &[MarkdownFile],
    changes: &ChangeSet,
) -> Result<()> {
    for path in &changes.deleted {
        entry.remove(path)?;
    }

    let by_path: HashMap<&Path, &MarkdownFile> = files
        .iter()
        .map(|file| (file.path.as_path(), file))
        .collect();
    for path in changes.upserts() {
        if let Some(file) = by_path.get(path.as_path()) {
            entry.upsert(file)?;
        }
    }

    entry.engine.commit()?;
    entry.timestamp = Utc::now();
    debug_assert!(entry.is_consistent());
    Ok(())
}

fn validate_folder(folder: &Path) -> Result<()> {
    if folder.as_os_str().is_empty() {
        return Err(SearchError::InvalidInput("folder path is required".to_string()));
    }
    Ok(())
}
