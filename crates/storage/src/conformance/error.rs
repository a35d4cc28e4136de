use std::future::Future;

use super::{plan_ref, seed_status, TestResult};
use crate::{DocumentStore, Patch, SetMode, StoreError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "get_nonexistent_is_not_found",
            get_nonexistent_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "update_nonexistent_fails_commit",
            update_nonexistent_fails_commit(factory).await,
        ),
        TestResult::from_result(
            "error",
            "update_after_absent_read_fails_immediately",
            update_after_absent_read_fails_immediately(factory).await,
        ),
        TestResult::from_result(
            "error",
            "read_after_write_rejected",
            read_after_write_rejected(factory).await,
        ),
        TestResult::from_result(
            "error",
            "list_unknown_collection_is_empty",
            list_unknown_collection_is_empty(factory).await,
        ),
    ]
}

// ── 1. get on empty store returns NotFound carrying the path ────────────────

async fn get_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get(&plan_ref("plan-404")).await {
        Err(StoreError::NotFound { path }) if path == "plans/plan-404" => Ok(()),
        other => Err(format!("expected NotFound for plans/plan-404, got {:?}", other)),
    }
}

// ── 2. update of a missing document fails and writes nothing ────────────────

async fn update_nonexistent_fails_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let counter = plan_ref("counter");
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.set_in(
        &mut snap,
        &counter,
        Patch::new().set("nextNumber", 1),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("set_in: {e}"))?;
    s.update_in(&mut snap, &plan_ref("missing"), Patch::new().set("a", 1))
        .await
        .map_err(|e| format!("update_in staged eagerly failed: {e}"))?;

    match s.commit_snapshot(snap).await {
        Err(StoreError::NotFound { .. }) => {}
        other => return Err(format!("expected NotFound on commit, got {:?}", other)),
    }
    match s.get(&counter).await {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!(
            "write staged before the failing update leaked: {:?}",
            other
        )),
    }
}

// ── 3. update after reading the target as absent fails at staging time ─────

async fn update_after_absent_read_fails_immediately<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("ghost");
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let found = s
        .get_in(&mut snap, &path)
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    if found.is_some() {
        return Err("empty store returned a document".to_string());
    }
    let result = s
        .update_in(&mut snap, &path, Patch::new().set("status", "x"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}

// ── 4. reads after the first staged write are rejected ──────────────────────

async fn read_after_write_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_status(&s, &plan_ref("plan-1"), "draft").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.update_in(
        &mut snap,
        &plan_ref("plan-1"),
        Patch::new().set("status", "confirmed"),
    )
    .await
    .map_err(|e| format!("update_in: {e}"))?;
    let result = s.get_in(&mut snap, &plan_ref("plan-1")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StoreError::ReadAfterWrite { .. }) => Ok(()),
        other => Err(format!("expected ReadAfterWrite, got {:?}", other)),
    }
}

// ── 5. listing a collection that was never written is empty ─────────────────

async fn list_unknown_collection_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let docs = s
        .list("nothing-here", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if docs.is_empty() {
        Ok(())
    } else {
        Err(format!("expected empty list, got {} documents", docs.len()))
    }
}
