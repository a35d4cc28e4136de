//! Snapshot isolation conformance tests.
//!
//! Verifies that staged writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use serde_json::json;

use super::{plan_ref, seed_status, status_of, TestResult};
use crate::{DocumentStore, Patch, SetMode, StoreError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "staged_write_invisible_before_commit",
        staged_write_invisible_before_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "committed_write_visible",
        committed_write_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_write_discarded",
        aborted_write_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discarded",
        dropped_snapshot_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "merge_keeps_unnamed_fields",
        merge_keeps_unnamed_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "replace_drops_unnamed_fields",
        replace_drops_unnamed_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "version_increments_per_commit",
        version_increments_per_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "list_filter_matches_field",
        list_filter_matches_field(factory).await,
    ));

    results
}

// ── 1. staged writes are not visible to plain reads ─────────────────────────

async fn staged_write_invisible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.set_in(
        &mut snap,
        &path,
        Patch::new().set("status", "draft"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("set_in: {e}"))?;

    let visible = s.get(&path).await;
    let _ = s.abort_snapshot(snap).await;
    match visible {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!("staged write visible before commit: {:?}", other)),
    }
}

// ── 2. committed writes are visible ─────────────────────────────────────────

async fn committed_write_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;
    let status = status_of(&s, &path).await?;
    if status != "draft" {
        return Err(format!("expected status 'draft', got '{status}'"));
    }
    let doc = s.get(&path).await.map_err(|e| format!("get: {e}"))?;
    if doc.version != 1 {
        return Err(format!("expected version 1 after create, got {}", doc.version));
    }
    Ok(())
}

// ── 3. aborted snapshots leave no trace ─────────────────────────────────────

async fn aborted_write_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.update_in(&mut snap, &path, Patch::new().set("status", "confirmed"))
        .await
        .map_err(|e| format!("update_in: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let status = status_of(&s, &path).await?;
    if status != "draft" {
        return Err(format!("aborted update applied: status '{status}'"));
    }
    Ok(())
}

// ── 4. dropping a snapshot is an abort ──────────────────────────────────────

async fn dropped_snapshot_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.set_in(
            &mut snap,
            &path,
            Patch::new().set("status", "draft"),
            SetMode::Replace,
        )
        .await
        .map_err(|e| format!("set_in: {e}"))?;
    }
    match s.get(&path).await {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!("dropped snapshot was applied: {:?}", other)),
    }
}

// ── 5. SetMode::Merge keeps fields not named in the patch ───────────────────

async fn merge_keeps_unnamed_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    s.set(
        &path,
        Patch::new().set("status", "draft").set("displayName", "Metro"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("seed: {e}"))?;
    s.set(&path, Patch::new().set("status", "confirmed"), SetMode::Merge)
        .await
        .map_err(|e| format!("merge: {e}"))?;

    let doc = s.get(&path).await.map_err(|e| format!("get: {e}"))?;
    if doc.fields.get("displayName") != Some(&json!("Metro")) {
        return Err(format!("merge dropped displayName: {:?}", doc.fields));
    }
    if doc.fields.get("status") != Some(&json!("confirmed")) {
        return Err(format!("merge did not write status: {:?}", doc.fields));
    }
    Ok(())
}

// ── 6. SetMode::Replace drops fields not named in the patch ─────────────────

async fn replace_drops_unnamed_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    s.set(
        &path,
        Patch::new().set("status", "draft").set("displayName", "Metro"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("seed: {e}"))?;
    s.set(&path, Patch::new().set("status", "draft"), SetMode::Replace)
        .await
        .map_err(|e| format!("replace: {e}"))?;

    let doc = s.get(&path).await.map_err(|e| format!("get: {e}"))?;
    if doc.fields.contains_key("displayName") {
        return Err(format!("replace kept displayName: {:?}", doc.fields));
    }
    Ok(())
}

// ── 7. each commit touching a document bumps its version once ───────────────

async fn version_increments_per_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.update_in(&mut snap, &path, Patch::new().set("status", "confirmed"))
        .await
        .map_err(|e| format!("update_in 1: {e}"))?;
    s.update_in(&mut snap, &path, Patch::new().set("grandTotal", 10))
        .await
        .map_err(|e| format!("update_in 2: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let doc = s.get(&path).await.map_err(|e| format!("get: {e}"))?;
    if doc.version != 2 {
        return Err(format!("expected version 2, got {}", doc.version));
    }
    if doc.fields.get("grandTotal") != Some(&json!(10)) {
        return Err("second staged update was not applied".to_string());
    }
    Ok(())
}

// ── 8. list with a field filter ─────────────────────────────────────────────

async fn list_filter_matches_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_status(&s, &plan_ref("plan-1"), "draft").await?;
    seed_status(&s, &plan_ref("plan-2"), "confirmed").await?;
    seed_status(&s, &plan_ref("plan-3"), "confirmed").await?;

    let all = s.list("plans", None).await.map_err(|e| format!("list: {e}"))?;
    if all.len() != 3 {
        return Err(format!("expected 3 plans, got {}", all.len()));
    }
    let confirmed = s
        .list("plans", Some(("status", &json!("confirmed"))))
        .await
        .map_err(|e| format!("list filtered: {e}"))?;
    let ids: Vec<&str> = confirmed.iter().map(|d| d.path.id.as_str()).collect();
    if ids != ["plan-2", "plan-3"] {
        return Err(format!("expected [plan-2, plan-3], got {:?}", ids));
    }
    Ok(())
}
