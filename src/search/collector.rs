use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use super::error::{Result, SearchError};

/// One Markdown file as read from disk during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub name: String,
    pub content: String,
}

/// Recursively collect every `.md` file under `root` with its content.
///
/// Unreadable entries are logged and left out. Only a missing or non-directory
/// root fails the whole collection.
pub fn collect_markdown_files(root: &Path) -> Result<Vec<MarkdownFile>> {
    let root_meta = fs::metadata(root)?;
    if !root_meta.is_dir() {
        return Err(SearchError::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    // Phase 1: walk (sorted so ids are assigned in a stable order)
    let paths: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("[collector] Skipping unreadable entry under {:?}: {}", root, e);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir() && is_markdown(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    // Phase 2: parallel read
    let files: Vec<MarkdownFile> = paths
        .par_iter()
        .filter_map(|path| match read_markdown_file(root, path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("[collector] Error reading file {:?}: {}", path, e);
                None
            }
        })
        .collect();

    log::debug!(
        "[collector] Collected {} of {} markdown files under {:?}",
        files.len(),
        paths.len(),
        root
    );
    Ok(files)
}

/// Exactly `.md`; `.MD` and `.markdown` are not collected.
pub fn is_markdown(path: &Path) -> bool {
    path.extension().map(|ext| ext == "md").unwrap_or(false)
}

fn read_markdown_file(root: &Path, path: &Path) -> std::io::Result<MarkdownFile> {
    let bytes = fs::read(path)?;
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(MarkdownFile {
        path: path.to_path_buf(),
        relative_path,
        name,
        content,
    })
}
