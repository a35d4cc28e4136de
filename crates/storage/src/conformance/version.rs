//! Version validation (OCC) conformance tests.
//!
//! A snapshot's read set pins the versions it observed. Any commit landing
//! on one of those documents in between must make this snapshot's commit
//! fail with `ConcurrentConflict`.

use std::future::Future;

use super::{plan_ref, seed_status, status_of, TestResult};
use crate::{DocumentStore, Patch, SetMode, StoreError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "changed_read_conflicts",
            changed_read_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "absent_read_then_created_conflicts",
            absent_read_then_created_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "unchanged_read_set_commits",
            unchanged_read_set_commits(factory).await,
        ),
        TestResult::from_result(
            "version",
            "blind_write_does_not_conflict",
            blind_write_does_not_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "sequential_snapshots_first_wins",
            sequential_snapshots_first_wins(factory).await,
        ),
    ]
}

async fn changed_read_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_in(&mut snap, &path)
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    s.update_in(&mut snap, &path, Patch::new().set("status", "confirmed"))
        .await
        .map_err(|e| format!("update_in: {e}"))?;

    seed_status(&s, &path, "cancelled").await?;

    match s.commit_snapshot(snap).await {
        Err(StoreError::ConcurrentConflict {
            path: conflict_path,
            expected_version,
        }) => {
            if conflict_path != "plans/plan-1" {
                return Err(format!("conflict reported on {conflict_path}"));
            }
            if expected_version != 1 {
                return Err(format!("expected_version {expected_version}, wanted 1"));
            }
        }
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
    let status = status_of(&s, &path).await?;
    if status != "cancelled" {
        return Err(format!("losing commit overwrote status: '{status}'"));
    }
    Ok(())
}

async fn absent_read_then_created_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let marker = plan_ref("marker");

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let seen = s
        .get_in(&mut snap, &marker)
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    if seen.is_some() {
        return Err("marker exists in empty store".to_string());
    }
    s.set_in(
        &mut snap,
        &marker,
        Patch::new().set("status", "mine"),
        SetMode::Replace,
    )
    .await
    .map_err(|e| format!("set_in: {e}"))?;

    seed_status(&s, &marker, "theirs").await?;

    match s.commit_snapshot(snap).await {
        Err(StoreError::ConcurrentConflict {
            expected_version, ..
        }) if expected_version == 0 => {}
        other => return Err(format!("expected conflict at version 0, got {:?}", other)),
    }
    let status = status_of(&s, &marker).await?;
    if status != "theirs" {
        return Err(format!("expected 'theirs', got '{status}'"));
    }
    Ok(())
}

async fn unchanged_read_set_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let read = plan_ref("plan-1");
    let other = plan_ref("plan-2");
    seed_status(&s, &read, "draft").await?;
    seed_status(&s, &other, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_in(&mut snap, &read)
        .await
        .map_err(|e| format!("get_in: {e}"))?;
    s.update_in(&mut snap, &read, Patch::new().set("status", "confirmed"))
        .await
        .map_err(|e| format!("update_in: {e}"))?;

    // Writes to documents outside the read set do not invalidate it.
    seed_status(&s, &other, "cancelled").await?;

    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit should succeed: {e}"))?;
    let doc = s.get(&read).await.map_err(|e| format!("get: {e}"))?;
    if doc.version != 2 {
        return Err(format!("expected version 2, got {}", doc.version));
    }
    Ok(())
}

async fn blind_write_does_not_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.set_in(
        &mut snap,
        &path,
        Patch::new().set("status", "confirmed"),
        SetMode::Merge,
    )
    .await
    .map_err(|e| format!("set_in: {e}"))?;
    seed_status(&s, &path, "cancelled").await?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("blind write commit: {e}"))?;

    let status = status_of(&s, &path).await?;
    if status != "confirmed" {
        return Err(format!("expected last writer 'confirmed', got '{status}'"));
    }
    Ok(())
}

/// Several snapshots read the same version; committing them one after
/// another lets exactly the first through.
async fn sequential_snapshots_first_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    const SNAPSHOTS: usize = 4;

    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;

    let mut snaps = Vec::new();
    for i in 0..SNAPSHOTS {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.get_in(&mut snap, &path)
            .await
            .map_err(|e| format!("get_in: {e}"))?;
        s.update_in(
            &mut snap,
            &path,
            Patch::new().set("status", format!("writer-{i}")),
        )
        .await
        .map_err(|e| format!("update_in: {e}"))?;
        snaps.push(snap);
    }

    let mut winners = 0usize;
    for snap in snaps {
        match s.commit_snapshot(snap).await {
            Ok(()) => winners += 1,
            Err(StoreError::ConcurrentConflict { .. }) => {}
            Err(e) => return Err(format!("unexpected commit error: {e}")),
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let status = status_of(&s, &path).await?;
    if status != "writer-0" {
        return Err(format!("expected 'writer-0', got '{status}'"));
    }
    Ok(())
}
