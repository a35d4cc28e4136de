//! Status writes.
//!
//! A write that changes the status also stamps the status version field with
//! the version that write commits at. The stamp tells the reconciliation
//! sweep which confirmation a plan is in when no change event was seen.

use async_trait::async_trait;
use ooh_storage::{
    run_transaction, Document, DocumentRef, DocumentStore, Patch, RetryPolicy, TransactionBody,
};
use serde_json::Value;

use crate::config::PlanConfig;
use crate::error::WorkflowError;

/// Result of [`StatusWriter::set_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub path: DocumentRef,
    pub from: Option<String>,
    pub to: String,
    /// Version committed by the write.
    pub version: i64,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from.as_deref() != Some(self.to.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StatusWriter {
    plan: PlanConfig,
    policy: RetryPolicy,
}

impl StatusWriter {
    pub fn new(plan: PlanConfig, policy: RetryPolicy) -> Self {
        Self { plan, policy }
    }

    /// Set the status of an existing document.
    pub async fn set_status<S: DocumentStore>(
        &self,
        store: &S,
        path: &DocumentRef,
        status: &str,
    ) -> Result<StatusChange, WorkflowError> {
        let body = StatusBody {
            plan: &self.plan,
            path,
            status,
        };
        let change = run_transaction(store, &self.policy, &body).await?;
        tracing::debug!(
            document = %change.path,
            from = change.from.as_deref().unwrap_or("-"),
            to = %change.to,
            version = change.version,
            "status written"
        );
        Ok(change)
    }
}

/// Status version stamped on `doc`, if any.
pub fn status_version(doc: &Document, plan: &PlanConfig) -> Option<i64> {
    doc.fields
        .get(&plan.status_version_field)
        .and_then(Value::as_i64)
}

/// Patch writing `status` to `doc`, stamped when the value changes.
pub(crate) fn status_patch(plan: &PlanConfig, doc: &Document, status: &str) -> Patch {
    let patch = Patch::new().set(plan.status_field.as_str(), status);
    if doc.str_field(&plan.status_field) == Some(status) {
        return patch;
    }
    patch.set(plan.status_version_field.as_str(), doc.version + 1)
}

struct StatusBody<'a> {
    plan: &'a PlanConfig,
    path: &'a DocumentRef,
    status: &'a str,
}

#[async_trait]
impl<'a, S: DocumentStore> TransactionBody<S> for StatusBody<'a> {
    type Output = StatusChange;
    type Error = WorkflowError;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<StatusChange, WorkflowError> {
        let doc = store
            .get_in(snapshot, self.path)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                path: self.path.path(),
            })?;
        store
            .update_in(snapshot, self.path, status_patch(self.plan, &doc, self.status))
            .await?;
        Ok(StatusChange {
            path: self.path.clone(),
            from: doc.str_field(&self.plan.status_field).map(str::to_string),
            to: self.status.to_string(),
            version: doc.version + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooh_storage::{MemoryStore, SetMode};

    async fn setup() -> (MemoryStore, DocumentRef, StatusWriter) {
        let store = MemoryStore::new();
        let path = DocumentRef::new("plans", "plan-1");
        store
            .set(&path, Patch::new().set("status", "draft"), SetMode::Replace)
            .await
            .unwrap();
        let writer = StatusWriter::new(PlanConfig::default(), RetryPolicy::default());
        (store, path, writer)
    }

    #[tokio::test]
    async fn change_stamps_committed_version() {
        let (store, path, writer) = setup().await;
        let change = writer.set_status(&store, &path, "confirmed").await.unwrap();
        assert!(change.changed());
        assert_eq!(change.from.as_deref(), Some("draft"));

        let doc = store.get(&path).await.unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(change.version, 2);
        assert_eq!(status_version(&doc, &PlanConfig::default()), Some(2));
    }

    #[tokio::test]
    async fn same_status_keeps_stamp() {
        let (store, path, writer) = setup().await;
        writer.set_status(&store, &path, "confirmed").await.unwrap();
        let again = writer.set_status(&store, &path, "confirmed").await.unwrap();
        assert!(!again.changed());

        let doc = store.get(&path).await.unwrap();
        assert_eq!(doc.version, 3);
        assert_eq!(status_version(&doc, &PlanConfig::default()), Some(2));
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let (store, _, writer) = setup().await;
        let err = writer
            .set_status(&store, &DocumentRef::new("plans", "ghost"), "confirmed")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
