//! Change feed conformance tests.

use std::future::Future;

use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use super::{plan_ref, seed_status, TestResult};
use crate::{DocumentStore, Patch};

pub(super) async fn run_feed_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "feed",
            "create_event_has_no_before",
            create_event_has_no_before(factory).await,
        ),
        TestResult::from_result(
            "feed",
            "update_event_carries_both_states",
            update_event_carries_both_states(factory).await,
        ),
        TestResult::from_result(
            "feed",
            "multi_document_commit_events_in_staging_order",
            multi_document_commit_events_in_staging_order(factory).await,
        ),
        TestResult::from_result(
            "feed",
            "aborted_and_failed_commits_emit_nothing",
            aborted_and_failed_commits_emit_nothing(factory).await,
        ),
    ]
}

async fn create_event_has_no_before<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rx = s.subscribe();
    seed_status(&s, &plan_ref("plan-1"), "draft").await?;

    let event = rx.try_recv().map_err(|e| format!("no event: {e}"))?;
    if event.path != plan_ref("plan-1") {
        return Err(format!("event for wrong path {}", event.path));
    }
    if event.before.is_some() || event.is_update() {
        return Err("create event carries a before-state".to_string());
    }
    match event.after {
        Some(doc) if doc.version == 1 => Ok(()),
        other => Err(format!("expected after-state at version 1, got {:?}", other)),
    }
}

async fn update_event_carries_both_states<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let path = plan_ref("plan-1");
    seed_status(&s, &path, "draft").await?;
    let mut rx = s.subscribe();
    s.update(&path, Patch::new().set("status", "confirmed"))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let event = rx.try_recv().map_err(|e| format!("no event: {e}"))?;
    let before = event.before.ok_or("update event without before-state")?;
    let after = event.after.ok_or("update event without after-state")?;
    if before.fields.get("status") != Some(&json!("draft")) {
        return Err(format!("before-state status: {:?}", before.fields.get("status")));
    }
    if after.fields.get("status") != Some(&json!("confirmed")) {
        return Err(format!("after-state status: {:?}", after.fields.get("status")));
    }
    if after.version != before.version + 1 {
        return Err(format!(
            "versions {} -> {} are not consecutive",
            before.version, after.version
        ));
    }
    Ok(())
}

async fn multi_document_commit_events_in_staging_order<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rx = s.subscribe();

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let first = s
        .create_in(&mut snap, "salesOrderEntries", Patch::new().set("n", 1))
        .await
        .map_err(|e| format!("create first: {e}"))?;
    let second = s
        .create_in(&mut snap, "purchaseOrderEntries", Patch::new().set("n", 2))
        .await
        .map_err(|e| format!("create second: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let a = rx.try_recv().map_err(|e| format!("first event: {e}"))?;
    let b = rx.try_recv().map_err(|e| format!("second event: {e}"))?;
    if a.path != first || b.path != second {
        return Err(format!(
            "events out of order: {} then {}",
            a.path, b.path
        ));
    }
    if a.event_id == b.event_id {
        return Err(format!("duplicate event id {}", a.event_id));
    }
    match rx.try_recv() {
        Err(TryRecvError::Empty) => Ok(()),
        other => Err(format!("unexpected extra event: {:?}", other)),
    }
}

async fn aborted_and_failed_commits_emit_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rx = s.subscribe();

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.create_in(&mut snap, "campaigns", Patch::new().set("n", 1))
        .await
        .map_err(|e| format!("create_in: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    if s.update(&plan_ref("missing"), Patch::new().set("status", "x"))
        .await
        .is_ok()
    {
        return Err("update of a missing document succeeded".to_string());
    }

    match rx.try_recv() {
        Err(TryRecvError::Empty) => Ok(()),
        other => Err(format!("expected no events, got {:?}", other)),
    }
}
