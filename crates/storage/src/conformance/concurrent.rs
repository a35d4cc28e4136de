use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::TestResult;
use crate::{
    run_transaction, DocumentRef, DocumentStore, Patch, RetryPolicy, SetMode, StoreError,
    TransactionBody,
};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_increments_never_lost",
            concurrent_increments_never_lost(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_increments_different_counters",
            concurrent_increments_different_counters(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "retry_budget_exhaustion_reported",
            retry_budget_exhaustion_reported(factory).await,
        ),
    ]
}

/// Read-modify-write of `{ n }` on one document.
struct Increment {
    path: DocumentRef,
}

#[async_trait]
impl<S: DocumentStore> TransactionBody<S> for Increment {
    type Output = u64;
    type Error = StoreError;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<u64, StoreError> {
        let current = store
            .get_in(snapshot, &self.path)
            .await?
            .and_then(|d| d.fields.get("n").and_then(|v| v.as_u64()))
            .unwrap_or(0);
        let next = current + 1;
        store
            .set_in(snapshot, &self.path, Patch::new().set("n", next), SetMode::Replace)
            .await?;
        Ok(next)
    }
}

fn generous_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: (N as u32) * 2,
        backoff_ms: 1,
    }
}

async fn counter_value<S: DocumentStore>(s: &S, path: &DocumentRef) -> Result<u64, String> {
    let doc = s.get(path).await.map_err(|e| format!("get {path}: {e}"))?;
    doc.fields
        .get("n")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("{path} has no numeric n"))
}

// ── N racing increments all land, each observing a distinct value ───────────

async fn concurrent_increments_never_lost<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let path = DocumentRef::new("counters", "shared");

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let body = Increment { path: path.clone() };
        handles.push(tokio::spawn(async move {
            run_transaction(s.as_ref(), &generous_policy(), &body).await
        }));
    }

    let mut seen = BTreeSet::new();
    for handle in handles {
        let value = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("transaction failed: {e}"))?;
        if !seen.insert(value) {
            return Err(format!("value {value} handed out twice"));
        }
    }

    let expected: BTreeSet<u64> = (1..=N as u64).collect();
    if seen != expected {
        return Err(format!("expected values 1..={N}, got {:?}", seen));
    }
    let stored = counter_value(storage.as_ref(), &path).await?;
    if stored != N as u64 {
        return Err(format!("expected stored counter {N}, got {stored}"));
    }
    Ok(())
}

// ── Increments on distinct counters do not interfere ────────────────────────

async fn concurrent_increments_different_counters<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let body = Increment {
            path: DocumentRef::new("counters", format!("c-{i}")),
        };
        handles.push(tokio::spawn(async move {
            run_transaction(s.as_ref(), &RetryPolicy::default(), &body).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
        if value != 1 {
            return Err(format!("counter c-{i}: expected 1, got {value}"));
        }
    }
    Ok(())
}

// ── A body that always loses its race surfaces RetriesExhausted ─────────────

/// Reads the document, then commits a competing write before returning, so
/// every attempt conflicts.
struct AlwaysLoses {
    path: DocumentRef,
}

#[async_trait]
impl<S: DocumentStore> TransactionBody<S> for AlwaysLoses {
    type Output = ();
    type Error = StoreError;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<(), StoreError> {
        store.get_in(snapshot, &self.path).await?;
        store
            .set(&self.path, Patch::new().set("n", 0), SetMode::Replace)
            .await?;
        store
            .set_in(snapshot, &self.path, Patch::new().set("n", 1), SetMode::Replace)
            .await
    }
}

async fn retry_budget_exhaustion_reported<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let policy = RetryPolicy {
        max_attempts: 3,
        backoff_ms: 0,
    };
    let body = AlwaysLoses {
        path: DocumentRef::new("counters", "contended"),
    };
    match run_transaction(&s, &policy, &body).await {
        Err(StoreError::RetriesExhausted { attempts: 3 }) => {}
        other => return Err(format!("expected RetriesExhausted(3), got {:?}", other)),
    }
    let stored = counter_value(&s, &body.path).await?;
    if stored != 0 {
        return Err(format!("losing writes were applied: n = {stored}"));
    }
    Ok(())
}
