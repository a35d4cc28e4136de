//! Retry-on-conflict transaction runner.
//!
//! A [`TransactionBody`] reads and stages writes against a fresh snapshot.
//! [`run_transaction`] commits it and, when the commit loses an OCC race,
//! begins a new snapshot and runs the body again. Bodies must therefore be
//! pure functions of what they read: no side effects before commit.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::traits::DocumentStore;

/// Retry budget for [`run_transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * backoff_ms` milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 5,
        }
    }
}

/// Work executed inside one snapshot.
#[async_trait]
pub trait TransactionBody<S: DocumentStore>: Send + Sync {
    type Output: Send;
    type Error: From<StoreError> + Send;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<Self::Output, Self::Error>;
}

/// Run `body` in a snapshot and commit it, retrying on commit conflicts.
///
/// Errors returned by the body abort the snapshot and are returned as-is.
/// When every attempt conflicts, returns `StoreError::RetriesExhausted`
/// converted into the body's error type.
pub async fn run_transaction<S, B>(
    store: &S,
    policy: &RetryPolicy,
    body: &B,
) -> Result<B::Output, B::Error>
where
    S: DocumentStore,
    B: TransactionBody<S>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let mut snapshot = store.begin_snapshot().await?;
        let output = match body.run(store, &mut snapshot).await {
            Ok(output) => output,
            Err(e) => {
                let _ = store.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };
        match store.commit_snapshot(snapshot).await {
            Ok(()) => return Ok(output),
            Err(e) if e.is_conflict() => {
                if attempt < attempts && policy.backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(policy.backoff_ms * attempt as u64))
                        .await;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::RetriesExhausted { attempts }.into())
}
