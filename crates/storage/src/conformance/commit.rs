use std::future::Future;

use serde_json::json;

use super::{plan_ref, seed_status, status_of, TestResult};
use crate::{DocumentRef, DocumentStore, Patch, SetMode, StoreError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "multi_document_writes_all_visible",
        multi_document_writes_all_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_document_conflict_applies_nothing",
        multi_document_conflict_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "create_assigns_fresh_identifier",
        create_assigns_fresh_identifier(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "server_timestamp_shared_within_commit",
        server_timestamp_shared_within_commit(factory).await,
    ));

    results
}

// ── 1. all writes of one snapshot become visible together ───────────────────

async fn multi_document_writes_all_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_status(&s, &plan_ref("plan-1"), "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_in(&mut snap, &plan_ref("plan-1"))
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    let so = s
        .create_in(&mut snap, "salesOrderEntries", Patch::new().set("planId", "plan-1"))
        .await
        .map_err(|e| format!("create so: {e}"))?;
    let po = s
        .create_in(&mut snap, "purchaseOrderEntries", Patch::new().set("planId", "plan-1"))
        .await
        .map_err(|e| format!("create po: {e}"))?;
    s.update_in(
        &mut snap,
        &plan_ref("plan-1"),
        Patch::new().set("status", "confirmed"),
    )
    .await
    .map_err(|e| format!("update_in: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    for path in [&so, &po] {
        s.get(path)
            .await
            .map_err(|e| format!("{path} missing after commit: {e}"))?;
    }
    let status = status_of(&s, &plan_ref("plan-1")).await?;
    if status != "confirmed" {
        return Err(format!("expected 'confirmed', got '{status}'"));
    }
    Ok(())
}

// ── 2. a conflicting commit applies none of its writes ──────────────────────

async fn multi_document_conflict_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let plan = plan_ref("plan-1");
    seed_status(&s, &plan, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_in(&mut snap, &plan)
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    let so = s
        .create_in(&mut snap, "salesOrderEntries", Patch::new().set("planId", "plan-1"))
        .await
        .map_err(|e| format!("create_in: {e}"))?;

    // Another writer changes the plan between read and commit.
    seed_status(&s, &plan, "cancelled").await?;

    match s.commit_snapshot(snap).await {
        Err(StoreError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
    match s.get(&so).await {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!("create from conflicted commit leaked: {:?}", other)),
    }
}

// ── 3. create_in yields a new identifier in the requested collection ────────

async fn create_assigns_fresh_identifier<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = s
        .create("campaigns", Patch::new().set("displayName", "A"))
        .await
        .map_err(|e| format!("create a: {e}"))?;
    let b = s
        .create("campaigns", Patch::new().set("displayName", "B"))
        .await
        .map_err(|e| format!("create b: {e}"))?;
    if a == b {
        return Err(format!("two creates returned the same path {a}"));
    }
    if a.collection != "campaigns" || a.id.is_empty() {
        return Err(format!("unexpected generated path {a}"));
    }
    let doc = s.get(&b).await.map_err(|e| format!("get: {e}"))?;
    if doc.fields.get("displayName") != Some(&json!("B")) {
        return Err(format!("created fields not stored: {:?}", doc.fields));
    }
    Ok(())
}

// ── 4. every ServerTimestamp in one commit resolves to the same instant ─────

async fn server_timestamp_shared_within_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = DocumentRef::new("counters", "invoiceNumber");
    let b = DocumentRef::new("pendingInvoices", "inv-1");
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.set_in(
        &mut snap,
        &a,
        Patch::new().server_timestamp("touchedAt"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("set a: {e}"))?;
    s.set_in(
        &mut snap,
        &b,
        Patch::new().server_timestamp("invoiceDate"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("set b: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let ta = s.get(&a).await.map_err(|e| format!("get a: {e}"))?;
    let tb = s.get(&b).await.map_err(|e| format!("get b: {e}"))?;
    match (ta.str_field("touchedAt"), tb.str_field("invoiceDate")) {
        (Some(x), Some(y)) if x == y => Ok(()),
        other => Err(format!("timestamps differ or missing: {:?}", other)),
    }
}
