//! In-memory `DocumentStore` backend.
//!
//! Committed state lives behind one mutex; commits validate their read set
//! and apply every staged write while holding it, so commits are linearized.
//! Change events are published on a `tokio::sync::broadcast` channel from
//! inside the critical section to keep feed order equal to commit order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::patch::{Patch, SetMode};
use crate::record::{ChangeEvent, Document, DocumentRef, Fields};
use crate::traits::DocumentStore;

/// Buffered change events per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 1024;

/// Length of store-generated document identifiers.
const GENERATED_ID_LEN: usize = 20;

/// A committed document as kept by [`MemoryStore`] and its image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub fields: Fields,
    pub version: i64,
    pub create_time: String,
    pub update_time: String,
}

/// Serializable copy of a store's committed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreImage {
    pub commit_seq: u64,
    pub collections: BTreeMap<String, BTreeMap<String, StoredDocument>>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, StoredDocument>>,
    commit_seq: u64,
}

impl Inner {
    fn find(&self, path: &DocumentRef) -> Option<&StoredDocument> {
        self.collections.get(&path.collection)?.get(&path.id)
    }
}

#[derive(Debug)]
enum WriteOp {
    Set(Patch, SetMode),
    Update(Patch),
    Create(Patch),
}

/// Snapshot of a [`MemoryStore`]: a read set and an ordered list of staged
/// writes. Nothing touches shared state until commit.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    reads: BTreeMap<DocumentRef, i64>,
    writes: Vec<(DocumentRef, WriteOp)>,
}

impl MemorySnapshot {
    fn stages_creation_of(&self, path: &DocumentRef) -> bool {
        self.writes
            .iter()
            .any(|(p, op)| p == path && matches!(op, WriteOp::Set(..) | WriteOp::Create(_)))
    }
}

/// Shared, cloneable in-memory document store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    feed: broadcast::Sender<ChangeEvent>,
    offline: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_image(StoreImage::default())
    }

    /// Rebuild a store from a previously exported image.
    pub fn from_image(image: StoreImage) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections: image.collections,
                commit_seq: image.commit_seq,
            })),
            feed,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Export the committed state.
    pub fn image(&self) -> Result<StoreImage, StoreError> {
        let inner = self.lock()?;
        Ok(StoreImage {
            commit_seq: inner.commit_seq,
            collections: inner.collections.clone(),
        })
    }

    /// Simulate an unreachable backend: while offline every call fails with
    /// `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

fn to_document(path: &DocumentRef, stored: &StoredDocument) -> Document {
    Document {
        path: path.clone(),
        fields: stored.fields.clone(),
        version: stored.version,
        create_time: stored.create_time.clone(),
        update_time: stored.update_time.clone(),
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

pub(crate) fn now_rfc3339() -> Result<String, StoreError> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| StoreError::Backend(format!("timestamp formatting: {e}")))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StoreError> {
        self.ensure_online()?;
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.lock()?;

        for (path, expected_version) in &snapshot.reads {
            let current = inner.find(path).map_or(0, |d| d.version);
            if current != *expected_version {
                return Err(StoreError::ConcurrentConflict {
                    path: path.path(),
                    expected_version: *expected_version,
                });
            }
        }

        if snapshot.writes.is_empty() {
            return Ok(());
        }

        let now = now_rfc3339()?;
        // path -> (before, after), in first-touch order.
        let mut order: Vec<DocumentRef> = Vec::new();
        let mut working: BTreeMap<DocumentRef, (Option<StoredDocument>, Option<Fields>)> =
            BTreeMap::new();

        for (path, op) in &snapshot.writes {
            if !working.contains_key(path) {
                let before = inner.find(path).cloned();
                let after = before.as_ref().map(|d| d.fields.clone());
                working.insert(path.clone(), (before, after));
                order.push(path.clone());
            }
            let Some((_, after)) = working.get_mut(path) else {
                continue;
            };
            match op {
                WriteOp::Set(patch, SetMode::Replace) => {
                    let mut fields = Fields::new();
                    patch.apply_to(&mut fields, &now);
                    *after = Some(fields);
                }
                WriteOp::Set(patch, SetMode::Merge) => {
                    let fields = after.get_or_insert_with(Fields::new);
                    patch.apply_to(fields, &now);
                }
                WriteOp::Update(patch) => match after.as_mut() {
                    Some(fields) => patch.apply_to(fields, &now),
                    None => return Err(StoreError::NotFound { path: path.path() }),
                },
                WriteOp::Create(patch) => {
                    if after.is_some() {
                        return Err(StoreError::AlreadyExists { path: path.path() });
                    }
                    let mut fields = Fields::new();
                    patch.apply_to(&mut fields, &now);
                    *after = Some(fields);
                }
            }
        }

        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        let mut events = Vec::with_capacity(order.len());
        for (index, path) in order.into_iter().enumerate() {
            let Some((before, Some(fields))) = working.remove(&path) else {
                continue;
            };
            let stored = StoredDocument {
                fields,
                version: before.as_ref().map_or(0, |d| d.version) + 1,
                create_time: before
                    .as_ref()
                    .map_or_else(|| now.clone(), |d| d.create_time.clone()),
                update_time: now.clone(),
            };
            events.push(ChangeEvent {
                event_id: format!("{seq}-{index}"),
                path: path.clone(),
                before: before.as_ref().map(|d| to_document(&path, d)),
                after: Some(to_document(&path, &stored)),
            });
            inner
                .collections
                .entry(path.collection.clone())
                .or_default()
                .insert(path.id.clone(), stored);
        }

        for event in events {
            // No subscribers is not an error.
            let _ = self.feed.send(event);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_in(
        &self,
        snapshot: &mut MemorySnapshot,
        path: &DocumentRef,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_online()?;
        if !snapshot.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite { path: path.path() });
        }
        let inner = self.lock()?;
        let found = inner.find(path).map(|d| to_document(path, d));
        let version = found.as_ref().map_or(0, |d| d.version);
        snapshot.reads.entry(path.clone()).or_insert(version);
        Ok(found)
    }

    async fn set_in(
        &self,
        snapshot: &mut MemorySnapshot,
        path: &DocumentRef,
        patch: Patch,
        mode: SetMode,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        snapshot
            .writes
            .push((path.clone(), WriteOp::Set(patch, mode)));
        Ok(())
    }

    async fn update_in(
        &self,
        snapshot: &mut MemorySnapshot,
        path: &DocumentRef,
        patch: Patch,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        if snapshot.reads.get(path) == Some(&0) && !snapshot.stages_creation_of(path) {
            return Err(StoreError::NotFound { path: path.path() });
        }
        snapshot.writes.push((path.clone(), WriteOp::Update(patch)));
        Ok(())
    }

    async fn create_in(
        &self,
        snapshot: &mut MemorySnapshot,
        collection: &str,
        patch: Patch,
    ) -> Result<DocumentRef, StoreError> {
        self.ensure_online()?;
        let path = DocumentRef::new(collection, generate_id());
        snapshot
            .writes
            .push((path.clone(), WriteOp::Create(patch)));
        Ok(path)
    }

    async fn get(&self, path: &DocumentRef) -> Result<Document, StoreError> {
        self.ensure_online()?;
        let inner = self.lock()?;
        inner
            .find(path)
            .map(|d| to_document(path, d))
            .ok_or_else(|| StoreError::NotFound { path: path.path() })
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<(&str, &Value)>,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_online()?;
        let inner = self.lock()?;
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, d)| filter.map_or(true, |(field, value)| d.fields.get(field) == Some(value)))
            .map(|(id, d)| to_document(&DocumentRef::new(collection, id.clone()), d))
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_passes_conformance_suite() {
        let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn generated_ids_are_distinct() {
        let store = MemoryStore::new();
        let a = store
            .create("campaigns", Patch::new().set("n", 1))
            .await
            .unwrap();
        let b = store
            .create("campaigns", Patch::new().set("n", 2))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(a.id.len(), GENERATED_ID_LEN);
    }

    #[tokio::test]
    async fn image_round_trip_preserves_versions() {
        let store = MemoryStore::new();
        let path = DocumentRef::new("plans", "plan-1");
        store
            .set(&path, Patch::new().set("status", "draft"), SetMode::Replace)
            .await
            .unwrap();
        store
            .update(&path, Patch::new().set("status", "confirmed"))
            .await
            .unwrap();

        let restored = MemoryStore::from_image(store.image().unwrap());
        let doc = restored.get(&path).await.unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.fields["status"], json!("confirmed"));

        // Commit sequence continues where the image left off.
        let mut feed = restored.subscribe();
        restored
            .update(&path, Patch::new().set("status", "draft"))
            .await
            .unwrap();
        let event = feed.recv().await.unwrap();
        assert_eq!(event.event_id, "3-0");
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let path = DocumentRef::new("plans", "plan-1");
        assert!(matches!(
            store.get(&path).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.begin_snapshot().await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(matches!(
            store.get(&path).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn server_timestamp_resolves_at_commit() {
        let store = MemoryStore::new();
        let path = DocumentRef::new("pendingInvoices", "inv-1");
        store
            .set(
                &path,
                Patch::new().server_timestamp("invoiceDate"),
                SetMode::Replace,
            )
            .await
            .unwrap();
        let doc = store.get(&path).await.unwrap();
        let stamp = doc.str_field("invoiceDate").unwrap();
        assert!(time::OffsetDateTime::parse(
            stamp,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
        assert_eq!(stamp, doc.update_time);
    }
}
