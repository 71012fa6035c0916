use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::collector::MarkdownFile;
use super::engine::IndexEngine;
use super::error::{Result, SearchError};
use super::FileId;

/// A file as it was last indexed, with its lines kept for previews.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub name: String,
    pub content: String,
    pub lines: Vec<String>,
}

impl FileRecord {
    fn new(id: FileId, file: &MarkdownFile) -> Self {
        Self {
            id,
            path: file.path.clone(),
            relative_path: file.relative_path.clone(),
            name: file.name.clone(),
            content: file.content.clone(),
            lines: split_lines(&file.content),
        }
    }

    /// Text handed to the index: file name, then content
    pub fn index_text(&self) -> String {
        format!("{} {}", self.name, self.content)
    }
}

fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

/// id <-> path table for one folder.
///
/// Ids come from a counter that only moves forward, so a removed file's id is
/// never handed to another file.
#[derive(Debug, Default)]
pub struct FileTable {
    records: BTreeMap<FileId, FileRecord>,
    by_path: HashMap<PathBuf, FileId>,
    next_id: u64,
}

impl FileTable {
    /// Insert a new file or replace the content of a known one.
    /// Returns the id and whether the path was new.
    pub fn upsert(&mut self, file: &MarkdownFile) -> (FileId, bool) {
        if let Some(&id) = self.by_path.get(&file.path) {
            if let Some(record) = self.records.get_mut(&id) {
                record.content = file.content.clone();
                record.lines = split_lines(&file.content);
            }
            return (id, false);
        }

        let id = FileId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, FileRecord::new(id, file));
        self.by_path.insert(file.path.clone(), id);
        (id, true)
    }

    pub fn remove_path(&mut self, path: &Path) -> Option<FileRecord> {
        let id = self.by_path.remove(path)?;
        self.records.remove(&id)
    }

    pub fn id_for(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: FileId) -> Option<&FileRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }
}

/// Cached index for one folder.
pub struct IndexCacheEntry {
    pub engine: IndexEngine,
    pub files: FileTable,
    pub timestamp: DateTime<Utc>,
}

impl IndexCacheEntry {
    /// Index every file into a fresh engine
    pub fn build(files: &[MarkdownFile], writer_heap_bytes: usize) -> Result<Self> {
        let mut entry = Self {
            engine: IndexEngine::new(writer_heap_bytes)?,
            files: FileTable::default(),
            timestamp: Utc::now(),
        };
        for file in files {
            entry.upsert(file)?;
        }
        entry.engine.commit()?;
        Ok(entry)
    }

    /// Stage `file` in both the table and the engine (commit separately)
    pub fn upsert(&mut self, file: &MarkdownFile) -> Result<FileId> {
        let (id, is_new) = self.files.upsert(file);
        let text = self
            .files
            .get(id)
            .map(FileRecord::index_text)
            .ok_or_else(|| SearchError::Internal(format!("file id {} missing from table", id)))?;
        if is_new {
            self.engine.add(id, &text)?;
        } else {
            self.engine.update(id, &text)?;
        }
        Ok(id)
    }

    /// Stage removal of `path`; false if it was not indexed
    pub fn remove(&mut self, path: &Path) -> Result<bool> {
        match self.files.remove_path(path) {
            Some(record) => self.engine.remove(record.id),
            None => Ok(false),
        }
    }

    /// Table ids and engine ids are the same set
    pub fn is_consistent(&self) -> bool {
        self.files.len() == self.engine.len()
            && self.files.iter().all(|record| self.engine.contains(record.id))
    }
}

/// Shared handle to a cached entry. Queries take the read lock; incremental
/// updates take the write lock only while applying a prepared change set.
pub type SharedEntry = Arc<tokio::sync::RwLock<IndexCacheEntry>>;

/// Resource a collaborator ties to a cached folder (typically a file watcher).
/// Dropping it releases the resource.
pub type WatchGuard = Box<dyn Any + Send + Sync>;

struct CacheSlot {
    entry: SharedEntry,
    watch_guard: Option<WatchGuard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
    pub path: PathBuf,
    pub file_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_folders: usize,
    pub folders: Vec<FolderStats>,
}

/// Folder -> cached index. One entry per folder; no expiry.
#[derive(Default)]
pub struct IndexCache {
    slots: RwLock<HashMap<PathBuf, CacheSlot>>,
}

impl IndexCache {
    pub fn get(&self, folder: &Path) -> Result<Option<SharedEntry>> {
        let slots = self.slots.read().map_err(SearchError::poisoned)?;
        Ok(slots.get(folder).map(|slot| Arc::clone(&slot.entry)))
    }

    /// Replace the folder's entry. An attached watch guard stays attached.
    pub fn put(&self, folder: &Path, entry: IndexCacheEntry) -> Result<SharedEntry> {
        let shared: SharedEntry = Arc::new(tokio::sync::RwLock::new(entry));
        let mut slots = self.slots.write().map_err(SearchError::poisoned)?;
        let watch_guard = slots
            .remove(folder)
            .and_then(|previous| previous.watch_guard);
        slots.insert(
            folder.to_path_buf(),
            CacheSlot {
                entry: Arc::clone(&shared),
                watch_guard,
            },
        );
        Ok(shared)
    }

    /// Drop the folder's entry and any watch guard. Returns whether one existed.
    pub fn invalidate(&self, folder: &Path) -> Result<bool> {
        let mut slots = self.slots.write().map_err(SearchError::poisoned)?;
        Ok(slots.remove(folder).is_some())
    }

    /// Drop every entry. Returns how many there were.
    pub fn invalidate_all(&self) -> Result<usize> {
        let mut slots = self.slots.write().map_err(SearchError::poisoned)?;
        let count = slots.len();
        slots.clear();
        Ok(count)
    }

    /// Attach `guard` to a cached folder, replacing (and releasing) any previous
    /// one. Returns false and drops `guard` if the folder is not cached.
    pub fn attach_watch_guard(&self, folder: &Path, guard: WatchGuard) -> Result<bool> {
        let mut slots = self.slots.write().map_err(SearchError::poisoned)?;
        match slots.get_mut(folder) {
            Some(slot) => {
                slot.watch_guard = Some(guard);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn has_watch_guard(&self, folder: &Path) -> Result<bool> {
        let slots = self.slots.read().map_err(SearchError::poisoned)?;
        Ok(slots
            .get(folder)
            .map(|slot| slot.watch_guard.is_some())
            .unwrap_or(false))
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let mut entries: Vec<(PathBuf, SharedEntry)> = {
            let slots = self.slots.read().map_err(SearchError::poisoned)?;
            slots
                .iter()
                .map(|(path, slot)| (path.clone(), Arc::clone(&slot.entry)))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut folders = Vec::with_capacity(entries.len());
        for (path, entry) in entries {
            let file_count = entry.read().await.files.len();
            folders.push(FolderStats { path, file_count });
        }
        Ok(CacheStats {
            total_folders: folders.len(),
            folders,
        })
    }
}
