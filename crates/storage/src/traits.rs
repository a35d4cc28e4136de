use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::patch::{Patch, SetMode};
use crate::record::{ChangeEvent, Document, DocumentRef};

/// The storage trait for document store backends.
///
/// A `DocumentStore` provides named documents grouped in collections,
/// atomic multi-document snapshots (transactions) and a change feed.
///
/// ## Snapshot Semantics
///
/// All transactional operations take `&mut Self::Snapshot`, a type
/// representing an in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Read with `get_in`, then stage writes with `set_in` / `update_in` /
///    `create_in`
/// 3. `commit_snapshot(snapshot)`: validate and apply every staged write
///    OR `abort_snapshot(snapshot)`: discard the transaction
///
/// Dropping a `Snapshot` without committing discards it.
///
/// All reads must precede the first write of a snapshot; a later read
/// returns `StoreError::ReadAfterWrite`.
///
/// ## OCC Conflict Detection
///
/// `get_in` records the version of every document it reads (0 when absent).
/// At commit the backend compares each recorded version with the current
/// one; any difference fails the commit with
/// `Err(StoreError::ConcurrentConflict { ... })` and nothing is applied.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store client can
/// be shared across async tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StoreError>;

    /// Commit a snapshot. All staged writes become visible together, or none
    /// do.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StoreError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StoreError>;

    // ── Document operations (within snapshot) ────────────────────────────────

    /// Read a document and record its version in the snapshot's read set.
    async fn get_in(
        &self,
        snapshot: &mut Self::Snapshot,
        path: &DocumentRef,
    ) -> Result<Option<Document>, StoreError>;

    /// Stage a write of `patch` to `path`, creating the document if needed.
    async fn set_in(
        &self,
        snapshot: &mut Self::Snapshot,
        path: &DocumentRef,
        patch: Patch,
        mode: SetMode,
    ) -> Result<(), StoreError>;

    /// Stage a merge of `patch` into an existing document.
    ///
    /// Fails with `NotFound` immediately if this snapshot already read the
    /// document as absent, and at commit otherwise.
    async fn update_in(
        &self,
        snapshot: &mut Self::Snapshot,
        path: &DocumentRef,
        patch: Patch,
    ) -> Result<(), StoreError>;

    /// Stage creation of a new document under a store-generated identifier.
    async fn create_in(
        &self,
        snapshot: &mut Self::Snapshot,
        collection: &str,
        patch: Patch,
    ) -> Result<DocumentRef, StoreError>;

    // ── Query operations (outside snapshot) ──────────────────────────────────

    /// Read a committed document.
    ///
    /// Returns `Err(StoreError::NotFound)` if the document does not exist.
    async fn get(&self, path: &DocumentRef) -> Result<Document, StoreError>;

    /// List committed documents of a collection, ordered by id, optionally
    /// keeping only those whose top-level `field` equals `value`.
    async fn list(
        &self,
        collection: &str,
        filter: Option<(&str, &Value)>,
    ) -> Result<Vec<Document>, StoreError>;

    // ── Change feed ──────────────────────────────────────────────────────────

    /// Subscribe to committed writes. Events of one commit are delivered in
    /// staging order, commits in commit order.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    // ── Single-write helpers ─────────────────────────────────────────────────

    /// `set_in` in a snapshot of its own.
    async fn set(&self, path: &DocumentRef, patch: Patch, mode: SetMode) -> Result<(), StoreError> {
        let mut snapshot = self.begin_snapshot().await?;
        if let Err(e) = self.set_in(&mut snapshot, path, patch, mode).await {
            let _ = self.abort_snapshot(snapshot).await;
            return Err(e);
        }
        self.commit_snapshot(snapshot).await
    }

    /// `update_in` in a snapshot of its own.
    async fn update(&self, path: &DocumentRef, patch: Patch) -> Result<(), StoreError> {
        let mut snapshot = self.begin_snapshot().await?;
        if let Err(e) = self.update_in(&mut snapshot, path, patch).await {
            let _ = self.abort_snapshot(snapshot).await;
            return Err(e);
        }
        self.commit_snapshot(snapshot).await
    }

    /// `create_in` in a snapshot of its own.
    async fn create(&self, collection: &str, patch: Patch) -> Result<DocumentRef, StoreError> {
        let mut snapshot = self.begin_snapshot().await?;
        let path = match self.create_in(&mut snapshot, collection, patch).await {
            Ok(path) => path,
            Err(e) => {
                let _ = self.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };
        self.commit_snapshot(snapshot).await?;
        Ok(path)
    }
}
