use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use super::error::{Result, SearchError};

/// Per-folder async mutexes serializing build and update work.
///
/// Two calls on the same folder queue behind each other; different folders
/// never contend.
#[derive(Default)]
pub struct FolderLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderLocks {
    pub async fn lock(&self, folder: &Path) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(SearchError::poisoned)?;
            Arc::clone(locks.entry(folder.to_path_buf()).or_default())
        };
        Ok(lock.lock_owned().await)
    }
}
