//! Transactional sequence numbers.
//!
//! A counter document `counters/{name}` holds `{ nextNumber }`, the number of
//! allocations committed so far. [`SequenceAllocator::allocate`] increments
//! it and stamps the formatted code onto a target document in the same
//! transaction, so either both writes land or neither does. Numbers are
//! strictly increasing per counter; a commit that fails after the number was
//! computed simply discards it.

use std::sync::Arc;

use async_trait::async_trait;
use ooh_storage::{
    run_transaction, Document, DocumentRef, DocumentStore, Patch, RetryPolicy, SetMode,
    TransactionBody,
};
use serde_json::Value;

use crate::error::WorkflowError;

/// Field of the counter document holding the allocation count.
pub const NEXT_NUMBER_FIELD: &str = "nextNumber";

/// Display format of allocated numbers: `prefix` followed by the number
/// zero-padded to at least `width` digits. Wider numbers are never truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFormat {
    pub prefix: String,
    pub width: usize,
}

impl SequenceFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    pub fn format(&self, number: u64) -> String {
        format!("{}{:0width$}", self.prefix, number, width = self.width)
    }
}

/// One allocation: which counter, which document receives the code, and how.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub counter: String,
    pub target: DocumentRef,
    pub format: SequenceFormat,
    /// Field of the target that receives the formatted code.
    pub code_field: String,
    /// Field of the target that receives the commit timestamp.
    pub timestamp_field: String,
    /// When the target already carries a code, return it instead of
    /// allocating a new number.
    pub keep_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// A fresh number was committed together with the target stamp.
    Assigned { number: u64, code: String },
    /// The target already had a code; nothing was written.
    Existing { code: String },
}

impl Allocation {
    pub fn code(&self) -> &str {
        match self {
            Allocation::Assigned { code, .. } | Allocation::Existing { code } => code,
        }
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            Allocation::Assigned { number, .. } => Some(*number),
            Allocation::Existing { .. } => None,
        }
    }
}

/// Allocates numbers from counters stored in one collection.
pub struct SequenceAllocator<S> {
    store: Arc<S>,
    counters: String,
    policy: RetryPolicy,
}

impl<S: DocumentStore> SequenceAllocator<S> {
    pub fn new(store: Arc<S>, counters: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            counters: counters.into(),
            policy,
        }
    }

    pub fn counter_ref(&self, name: &str) -> DocumentRef {
        DocumentRef::new(self.counters.as_str(), name)
    }

    /// Number of committed allocations of `name`; 0 when never used.
    pub async fn current(&self, name: &str) -> Result<u64, WorkflowError> {
        let path = self.counter_ref(name);
        match self.store.get(&path).await {
            Ok(doc) => counter_value(&doc),
            Err(ooh_storage::StoreError::NotFound { .. }) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, WorkflowError> {
        let body = AllocateBody {
            counter: self.counter_ref(&request.counter),
            request,
        };
        let allocation = run_transaction(self.store.as_ref(), &self.policy, &body).await?;
        match &allocation {
            Allocation::Assigned { number, code } => tracing::info!(
                counter = %request.counter,
                document = %request.target,
                number,
                code = %code,
                "sequence number allocated"
            ),
            Allocation::Existing { code } => tracing::debug!(
                document = %request.target,
                code = %code,
                "target already numbered"
            ),
        }
        Ok(allocation)
    }
}

/// The allocation transaction. Reads counter and target before any write.
struct AllocateBody<'a> {
    counter: DocumentRef,
    request: &'a AllocationRequest,
}

#[async_trait]
impl<'a, S: DocumentStore> TransactionBody<S> for AllocateBody<'a> {
    type Output = Allocation;
    type Error = WorkflowError;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<Allocation, WorkflowError> {
        let request = self.request;
        let current = match store.get_in(snapshot, &self.counter).await? {
            Some(doc) => counter_value(&doc)?,
            None => 0,
        };
        let target = store
            .get_in(snapshot, &request.target)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                path: request.target.path(),
            })?;

        if request.keep_existing {
            if let Some(code) = target.str_field(&request.code_field) {
                return Ok(Allocation::Existing {
                    code: code.to_string(),
                });
            }
        }

        let number = current
            .checked_add(1)
            .ok_or_else(|| WorkflowError::invalid(&self.counter, "counter overflow"))?;
        let code = request.format.format(number);

        store
            .set_in(
                snapshot,
                &self.counter,
                Patch::new().set(NEXT_NUMBER_FIELD, number),
                SetMode::Merge,
            )
            .await?;
        store
            .update_in(
                snapshot,
                &request.target,
                Patch::new()
                    .set(request.code_field.as_str(), code.as_str())
                    .server_timestamp(request.timestamp_field.as_str()),
            )
            .await?;
        Ok(Allocation::Assigned { number, code })
    }
}

fn counter_value(doc: &Document) -> Result<u64, WorkflowError> {
    match doc.fields.get(NEXT_NUMBER_FIELD) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            WorkflowError::invalid(
                &doc.path,
                format!("{NEXT_NUMBER_FIELD} must be a non-negative integer, got {value}"),
            )
        }),
    }
}
