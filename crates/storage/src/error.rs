/// All errors that can be returned by a DocumentStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency control conflict: a document read inside the
    /// snapshot was modified by another commit before this one.
    #[error("concurrent conflict on {path}: expected version {expected_version}")]
    ConcurrentConflict { path: String, expected_version: i64 },

    /// No document exists at the given path.
    #[error("document not found: {path}")]
    NotFound { path: String },

    /// A create targeted a path that is already occupied.
    #[error("document already exists: {path}")]
    AlreadyExists { path: String },

    /// A read was issued after the snapshot already staged a write.
    #[error("read of {path} after a write in the same snapshot")]
    ReadAfterWrite { path: String },

    /// The backend cannot be reached.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// `run_transaction` gave up after repeated commit conflicts.
    #[error("transaction retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A backend-specific storage error (serialization, corrupt data, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for errors a caller may resolve by re-running the transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrentConflict { .. })
    }
}
