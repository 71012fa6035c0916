//! Collaborator-facing operations.
//!
//! Each function wraps a [`SearchManager`] call and flattens its `Result` into
//! the `{ success, ... }` response shapes the UI layer consumes. Nothing here
//! returns an error; failures become `success: false` with a message.

use std::path::Path;

use serde::Serialize;

use super::{CacheStats, ErrorKind, FileMatch, SearchError, SearchManager, SearchOptions};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesResponse {
    pub success: bool,
    pub results: Vec<FileMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsUpdateResponse {
    pub success: bool,
    pub needs_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
}

impl MessageResponse {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            error: None,
            error_kind: None,
        }
    }

    fn failed(e: &SearchError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(e.to_string()),
            error_kind: Some(e.kind()),
        }
    }
}

pub async fn search_files(
    manager: &SearchManager,
    folder_path: &str,
    query: &str,
    auto_update: Option<bool>,
    force_refresh: Option<bool>,
) -> SearchFilesResponse {
    let defaults = SearchOptions::default();
    let options = SearchOptions {
        auto_update: auto_update.unwrap_or(defaults.auto_update),
        force_refresh: force_refresh.unwrap_or(defaults.force_refresh),
    };

    match manager.search(Path::new(folder_path), query, options).await {
        Ok(found) => SearchFilesResponse {
            success: true,
            total: Some(found.total),
            results: found.results,
            error: None,
            error_kind: None,
        },
        Err(e) => {
            if e.kind() != ErrorKind::InvalidInput {
                log::error!("[search_files] Search error in {}: {}", folder_path, e);
            }
            SearchFilesResponse {
                success: false,
                results: Vec::new(),
                total: None,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
            }
        }
    }
}

pub async fn build_index(manager: &SearchManager, folder_path: &str) -> MessageResponse {
    match manager.build_index_for_folder(Path::new(folder_path)).await {
        Ok(report) => MessageResponse::ok(format!(
            "Index built: {} files in {}ms",
            report.file_count, report.elapsed_ms
        )),
        Err(e) => {
            log::error!("[build_index] Failed for {}: {}", folder_path, e);
            MessageResponse::failed(&e)
        }
    }
}

pub async fn refresh_index(manager: &SearchManager, folder_path: &str) -> MessageResponse {
    match manager.refresh_index(Path::new(folder_path)).await {
        Ok(report) => MessageResponse::ok(format!(
            "Index refreshed: {} files in {}ms",
            report.file_count, report.elapsed_ms
        )),
        Err(e) => {
            log::error!("[refresh_index] Failed for {}: {}", folder_path, e);
            MessageResponse::failed(&e)
        }
    }
}

/// Stats of every cached folder; an internal failure reports no folders
pub async fn get_index_stats(manager: &SearchManager) -> CacheStats {
    match manager.cache_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("[get_index_stats] {}", e);
            CacheStats::default()
        }
    }
}

/// Clear one folder's cached index, or every folder when `folder_path` is `None`
pub fn clear_index_cache(manager: &SearchManager, folder_path: Option<&str>) -> ClearCacheResponse {
    let cleared = match folder_path {
        Some(folder) => manager.clear_index_cache(Path::new(folder)).map(|_| ()),
        None => manager.clear_all_cache().map(|_| ()),
    };
    match cleared {
        Ok(()) => ClearCacheResponse { success: true },
        Err(e) => {
            log::error!("[clear_index_cache] {}", e);
            ClearCacheResponse { success: false }
        }
    }
}

pub async fn needs_index_update(manager: &SearchManager, folder_path: &str) -> NeedsUpdateResponse {
    match manager.needs_index_update(Path::new(folder_path)).await {
        Ok(needs_update) => NeedsUpdateResponse {
            success: true,
            needs_update,
            error: None,
        },
        Err(e) => {
            log::error!("[needs_index_update] Failed for {}: {}", folder_path, e);
            NeedsUpdateResponse {
                success: false,
                needs_update: false,
                error: Some(e.to_string()),
            }
        }
    }
}
