use std::fmt;

use ooh_storage::StoreError;

use crate::config::ConfigError;

/// Errors raised by allocations, derivation jobs and the watcher.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A referenced source document does not exist.
    #[error("document not found: {path}")]
    NotFound { path: String },
    /// A source or counter document has missing or mistyped fields.
    #[error("invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
    /// The plan was converted to a campaign before.
    #[error("plan {plan} is already converted")]
    AlreadyConverted { plan: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`WorkflowError`] for callers deciding whether
/// to retry, skip or surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    TransactionConflict,
    UpstreamUnavailable,
    InvalidDocument,
    AlreadyConverted,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransactionConflict => "transaction_conflict",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::InvalidDocument => "invalid_document",
            ErrorKind::AlreadyConverted => "already_converted",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            WorkflowError::AlreadyConverted { .. } => ErrorKind::AlreadyConverted,
            WorkflowError::Config(_) => ErrorKind::Config,
            WorkflowError::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::ConcurrentConflict { .. } | StoreError::RetriesExhausted { .. } => {
                    ErrorKind::TransactionConflict
                }
                StoreError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
                StoreError::AlreadyExists { .. }
                | StoreError::ReadAfterWrite { .. }
                | StoreError::Backend(_) => ErrorKind::Internal,
            },
        }
    }

    pub(crate) fn invalid(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        WorkflowError::InvalidDocument {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        let cases = [
            (
                StoreError::NotFound {
                    path: "plans/p".into(),
                },
                ErrorKind::NotFound,
            ),
            (
                StoreError::RetriesExhausted { attempts: 5 },
                ErrorKind::TransactionConflict,
            ),
            (
                StoreError::Unavailable("offline".into()),
                ErrorKind::UpstreamUnavailable,
            ),
            (StoreError::Backend("boom".into()), ErrorKind::Internal),
        ];
        for (store, kind) in cases {
            assert_eq!(WorkflowError::from(store).kind(), kind);
        }
    }

    #[test]
    fn display_is_readable() {
        let err = WorkflowError::NotFound {
            path: "plans/missing".into(),
        };
        assert_eq!(err.to_string(), "document not found: plans/missing");
        assert_eq!(err.kind().to_string(), "not_found");
    }
}
