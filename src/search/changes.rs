use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collector::MarkdownFile;

/// Modification fingerprint of one file as last indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

impl FileStat {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            mtime: DateTime::<Utc>::from(metadata.modified()?),
            size: metadata.len(),
        })
    }
}

/// In-memory path -> [`FileStat`] table shared by every folder.
#[derive(Debug, Default)]
pub struct FileStats {
    entries: HashMap<PathBuf, FileStat>,
}

impl FileStats {
    pub fn get(&self, path: &Path) -> Option<&FileStat> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: PathBuf, stat: FileStat) {
        self.entries.insert(path, stat);
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileStat> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stats for every path inside `folder` (component-wise prefix)
    pub fn snapshot(&self, folder: &Path) -> BTreeMap<PathBuf, FileStat> {
        self.entries
            .iter()
            .filter(|(path, _)| path.starts_with(folder))
            .map(|(path, stat)| (path.clone(), *stat))
            .collect()
    }

    /// Merge loaded stats; entries outside the loaded set are untouched
    pub fn merge(&mut self, loaded: BTreeMap<PathBuf, FileStat>) {
        self.entries.extend(loaded);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn paths_under(&self, folder: &Path) -> BTreeSet<PathBuf> {
        self.entries
            .keys()
            .filter(|path| path.starts_with(folder))
            .cloned()
            .collect()
    }
}

/// Files that differ between a fresh scan and the recorded stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub modified: Vec<PathBuf>,
    pub added: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.deleted.len()
    }

    /// Every file present in the scan with new content
    pub fn upserts(&self) -> impl Iterator<Item = &PathBuf> {
        self.modified.iter().chain(self.added.iter())
    }
}

/// Classify `files` against `stats` and record the fingerprints observed.
///
/// Recording happens here rather than after the index is updated, so the caller
/// must apply the returned change set before anything else reads `stats`.
pub fn check_folder_changes(
    stats: &mut FileStats,
    folder: &Path,
    files: &[MarkdownFile],
) -> ChangeSet {
    let (changes, observed) = classify(stats, folder, files);
    for (path, stat) in observed {
        stats.insert(path, stat);
    }
    changes
}

/// Same classification as [`check_folder_changes`] without touching `stats`.
pub fn peek_folder_changes(stats: &FileStats, folder: &Path, files: &[MarkdownFile]) -> ChangeSet {
    classify(stats, folder, files).0
}

fn classify(
    stats: &FileStats,
    folder: &Path,
    files: &[MarkdownFile],
) -> (ChangeSet, Vec<(PathBuf, FileStat)>) {
    let mut changes = ChangeSet::default();
    let mut observed = Vec::new();
    let mut deleted = stats.paths_under(folder);

    for file in files {
        deleted.remove(&file.path);

        let current = match FileStat::read(&file.path) {
            Ok(stat) => stat,
            Err(e) => {
                log::warn!("[changes] Error checking file {:?}: {}", file.path, e);
                continue;
            }
        };

        match stats.get(&file.path) {
            None => changes.added.push(file.path.clone()),
            Some(previous) if *previous != current => changes.modified.push(file.path.clone()),
            Some(_) => continue,
        }
        observed.push((file.path.clone(), current));
    }

    changes.deleted = deleted.into_iter().collect();
    (changes, observed)
}
