use std::sync::Arc;

use crate::types::CacheKey;

/// Coarse classification of failures, for callers that only need to pick a UI affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend has no record. On the read path this is a valid empty state, not a failure.
    NotFound,
    NetworkFailure,
    /// Rejected synchronously because another mutation of the same key is still pending.
    MutationConflict,
    /// The network mutation failed after the optimistic value was applied; it has been rolled back.
    MutationFailed,
    /// Superseded by [`SyncContext::clear_all()`](crate::SyncContext::clear_all).
    Cancelled,
    InvalidInput,
    Config,
    Internal,
}

/// Errors produced at the catalog API boundary.
///
/// The type is `Clone` because a single failed fetch is shared with every waiter of the deduplicated request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),
    #[error("unexpected status {status} from {path}")]
    Status { status: u16, path: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("Config error: {0}")]
    Config(String),
    /// The submission never produced an answer: it panicked or its task was cancelled.
    #[error("submission aborted: {0}")]
    Aborted(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("failed to load {key}: {source}")]
    NetworkFailure {
        key:    CacheKey,
        #[source]
        source: ApiError,
    },
    #[error("a mutation of {0} is already pending")]
    MutationConflict(CacheKey),
    #[error("mutation of {key} failed and was rolled back: {source}")]
    MutationFailed {
        key:    CacheKey,
        #[source]
        source: ApiError,
    },
    #[error("{0} was cancelled by a cache reset")]
    Cancelled(CacheKey),
    #[error("invalid score: {0}")]
    InvalidScore(String),
    #[error("invalid value: {0}")]
    InvalidInput(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkFailure { source, .. } if source.is_not_found() => ErrorKind::NotFound,
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::MutationConflict(_) => ErrorKind::MutationConflict,
            Self::MutationFailed { .. } => ErrorKind::MutationFailed,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::InvalidScore(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Config(_) => ErrorKind::Config,
            Self::Task(_) => ErrorKind::Internal,
        }
    }

    /// The cache key the error relates to, if any.
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            Self::NetworkFailure { key, .. } | Self::MutationFailed { key, .. } => Some(key),
            Self::MutationConflict(key) | Self::Cancelled(key) => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_classified_as_empty_state() {
        let err = SyncError::NetworkFailure {
            key:    CacheKey::status("death-note"),
            source: ApiError::Status {
                status: 404,
                path:   "/watch/death-note".into(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = SyncError::NetworkFailure {
            key:    CacheKey::status("death-note"),
            source: ApiError::Rejected("boom".into()),
        };
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
        assert_eq!(err.key(), Some(&CacheKey::status("death-note")));
    }
}
