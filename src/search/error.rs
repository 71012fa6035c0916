use serde::Serialize;

use super::FileId;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("File id {0} is already indexed")]
    DuplicateId(FileId),

    #[error("File id {0} is not indexed")]
    UnknownId(FileId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category reported to collaborators alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidInput,
    Io,
    Index,
    Storage,
    Internal,
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::InvalidInput(_) => ErrorKind::InvalidInput,
            SearchError::Io(_) => ErrorKind::Io,
            SearchError::Index(_) | SearchError::DuplicateId(_) | SearchError::UnknownId(_) => {
                ErrorKind::Index
            }
            SearchError::Serialization(_) => ErrorKind::Storage,
            SearchError::Task(_) | SearchError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> Self {
        SearchError::Internal("lock poisoned".to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
