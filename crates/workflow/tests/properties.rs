//! End-to-end workflow properties against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use ooh_storage::{DocumentRef, DocumentStore, MemoryStore, Patch, RetryPolicy, SetMode};
use ooh_workflow::{
    Allocation, DerivationOutcome, ErrorKind, SequenceFormat, StatusTrigger, Workflow,
    WorkflowConfig,
};
use serde_json::{json, Value};

fn workflow() -> Workflow<MemoryStore> {
    let mut config = WorkflowConfig::default();
    config.transaction = RetryPolicy {
        max_attempts: 64,
        backoff_ms: 1,
    };
    Workflow::new(Arc::new(MemoryStore::new()), config)
}

async fn put(store: &MemoryStore, path: &str, fields: Value) -> DocumentRef {
    let path = DocumentRef::parse(path).unwrap();
    let fields = fields.as_object().unwrap().clone();
    store
        .set(&path, Patch::from(fields), SetMode::Replace)
        .await
        .unwrap();
    path
}

fn plan_fields(status: &str) -> Value {
    json!({
        "status": status,
        "customerId": "cust-1",
        "employeeId": "emp-1",
        "displayName": "Highway Q4",
        "startDate": "2026-10-01",
        "endDate": "2026-12-31",
        "costSummary": { "totalBeforeTax": 390500, "grandTotal": 460790 }
    })
}

async fn set_status(store: &MemoryStore, path: &DocumentRef, status: &str) {
    store
        .update(path, Patch::new().set("status", status))
        .await
        .unwrap();
}

// ── Sequence allocation ─────────────────────────────────────────────────────

#[test]
fn invoice_codes_are_padded_not_truncated() {
    let format = WorkflowConfig::default().invoice.format();
    assert_eq!(format.format(1), "INV-00001");
    assert_eq!(format.format(42), "INV-00042");
    assert_eq!(format.format(100000), "INV-100000");
    assert_eq!(format, SequenceFormat::new("INV-", 5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_are_unique_and_contiguous() {
    const N: u64 = 16;
    let workflow = Arc::new(workflow());
    let store = workflow.store().clone();
    put(&store, "counters/invoiceNumber", json!({ "nextNumber": 7 })).await;
    for i in 0..N {
        put(&store, &format!("pendingInvoices/inv-{i}"), json!({ "amount": i })).await;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let workflow = workflow.clone();
        handles.push(tokio::spawn(async move {
            workflow.number_invoice(&format!("inv-{i}")).await
        }));
    }

    let mut numbers = BTreeSet::new();
    let mut codes = BTreeSet::new();
    for handle in handles {
        let allocation = handle.await.unwrap().unwrap();
        numbers.insert(allocation.number().unwrap());
        codes.insert(allocation.code().to_string());
    }
    assert_eq!(numbers, (8..8 + N).collect::<BTreeSet<_>>());
    assert_eq!(codes.len(), N as usize);
    assert_eq!(
        workflow.allocator().current("invoiceNumber").await.unwrap(),
        7 + N
    );

    // each invoice carries the code it was handed
    for i in 0..N {
        let doc = store
            .get(&DocumentRef::new("pendingInvoices", format!("inv-{i}")))
            .await
            .unwrap();
        assert!(codes.contains(doc.str_field("invoiceNumber").unwrap()));
    }
}

#[tokio::test]
async fn failed_allocations_leave_counter_unchanged() {
    let workflow = workflow();
    let store = workflow.store().clone();
    put(&store, "pendingInvoices/a", json!({})).await;
    put(&store, "pendingInvoices/b", json!({})).await;

    workflow.number_invoice("a").await.unwrap();
    let err = workflow.number_invoice("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    store.set_offline(true);
    let err = workflow.number_invoice("b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    store.set_offline(false);

    assert_eq!(workflow.allocator().current("invoiceNumber").await.unwrap(), 1);
    let next = workflow.number_invoice("b").await.unwrap();
    assert_eq!(
        next,
        Allocation::Assigned {
            number: 2,
            code: "INV-00002".to_string()
        }
    );
}

// ── Status transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn confirmation_sequence_fires_on_edges_only() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let watcher = workflow.watcher();
    let trigger = StatusTrigger::new("plans", "status", "confirmed");
    let mut rx = store.subscribe();

    let steps = ["draft", "confirmed", "confirmed", "draft", "confirmed"];
    let mut fired = Vec::new();
    for (i, status) in steps.iter().enumerate() {
        set_status(&store, &path, status).await;
        let event = rx.recv().await.unwrap();
        if trigger.evaluate(&event).is_some() {
            fired.push(i + 1);
        }
        let dispatched = watcher.handle(&event).await.unwrap();
        assert_eq!(dispatched.is_empty(), trigger.evaluate(&event).is_none());
        // skip the SO, PO and marker creations of a derivation
        for _ in 0..dispatched.len() * 3 {
            rx.recv().await.unwrap();
        }
    }
    assert_eq!(fired, vec![2, 5]);

    // re-confirmation after leaving the status derives again
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 2);
    assert_eq!(store.list("purchaseOrderEntries", None).await.unwrap().len(), 2);
    let markers = store.list("derivationMarkers", None).await.unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].fields["sourceVersion"], json!(6));
}

#[tokio::test]
async fn orders_copy_cost_summary() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    set_status(&store, &path, "confirmed").await;

    let report = workflow.watcher().drain(&mut rx).await;
    assert_eq!(report.dispatched.len(), 1);

    let so = &store.list("salesOrderEntries", None).await.unwrap()[0];
    assert_eq!(so.fields["invoiceAmount"], json!(390500));
    assert_eq!(so.fields["invoiceAmountWithTax"], json!(460790));
    assert_eq!(so.fields["status"], json!("approved"));
    assert_eq!(so.fields["displayName"], json!("Highway Q4"));

    let po = &store.list("purchaseOrderEntries", None).await.unwrap()[0];
    assert_eq!(po.fields["poAmount"], json!(390500));
    assert_eq!(po.fields["poStatus"], json!("generated"));
    assert_eq!(po.fields["planId"], json!("plan-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_derives_once() {
    let workflow = Arc::new(workflow());
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    set_status(&store, &path, "confirmed").await;
    let event = rx.recv().await.unwrap();
    let transition = workflow.confirmed_trigger().evaluate(&event).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let workflow = workflow.clone();
        let transition = transition.clone();
        handles.push(tokio::spawn(async move {
            workflow.derive_orders(&transition).await
        }));
    }
    let mut derived = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            DerivationOutcome::Derived { .. } => derived += 1,
            DerivationOutcome::AlreadyDerived { .. } => {}
        }
    }
    assert_eq!(derived, 1);
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 1);
    assert_eq!(store.list("purchaseOrderEntries", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_derivation_is_repaired_by_sweep() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    set_status(&store, &path, "confirmed").await;
    let event = rx.recv().await.unwrap();

    store.set_offline(true);
    let err = workflow.watcher().handle(&event).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    store.set_offline(false);
    assert!(store.list("salesOrderEntries", None).await.unwrap().is_empty());

    let report = workflow.reconciler().sweep(false).await.unwrap();
    assert_eq!(report.repaired, vec!["plans/plan-1".to_string()]);
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_before_a_late_event_derives_once() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    set_status(&store, &path, "confirmed").await;
    let confirmed = rx.recv().await.unwrap();
    store
        .update(&path, Patch::new().set("remarks", "client asked for night lighting"))
        .await
        .unwrap();

    let report = workflow.reconciler().sweep(false).await.unwrap();
    assert_eq!(report.repaired, vec!["plans/plan-1".to_string()]);

    let dispatched = workflow.watcher().handle(&confirmed).await.unwrap();
    assert!(matches!(
        dispatched[0].outcome,
        DerivationOutcome::AlreadyDerived { .. }
    ));
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 1);
    assert_eq!(store.list("purchaseOrderEntries", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_repairs_a_lost_reconfirmation() {
    let workflow = workflow();
    let store = workflow.store().clone();
    put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    workflow.set_status("plans", "plan-1", "confirmed").await.unwrap();
    let report = workflow.watcher().drain(&mut rx).await;
    assert_eq!(report.dispatched.len(), 1);

    workflow.set_status("plans", "plan-1", "draft").await.unwrap();
    // the change event of this confirmation is never handled
    let change = workflow.set_status("plans", "plan-1", "confirmed").await.unwrap();
    assert_eq!(change.version, 4);

    let dry = workflow.reconciler().sweep(true).await.unwrap();
    assert_eq!(dry.missing, vec!["plans/plan-1".to_string()]);
    let report = workflow.reconciler().sweep(false).await.unwrap();
    assert_eq!(report.repaired, vec!["plans/plan-1".to_string()]);
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 2);

    let again = workflow.reconciler().sweep(false).await.unwrap();
    assert!(again.missing.is_empty());
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn edits_after_a_derived_confirmation_are_not_missing() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let path = put(&store, "plans/plan-1", plan_fields("draft")).await;
    let mut rx = store.subscribe();
    workflow.set_status("plans", "plan-1", "confirmed").await.unwrap();
    workflow.watcher().drain(&mut rx).await;
    store
        .update(&path, Patch::new().set("remarks", "moved to week 42"))
        .await
        .unwrap();

    let report = workflow.reconciler().sweep(false).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert!(report.missing.is_empty());
    assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 1);
}

// ── Plan -> Campaign ────────────────────────────────────────────────────────

#[tokio::test]
async fn plan_converts_to_campaign() {
    let workflow = workflow();
    let store = workflow.store().clone();
    let plan = put(
        &store,
        "plans/plan-1",
        json!({ "displayName": "X", "status": "Active" }),
    )
    .await;

    let campaign = workflow.convert_plan("plan-1").await.unwrap();
    let stored = store.get(&campaign).await.unwrap();
    assert_eq!(stored.str_field("displayName"), Some("X"));
    assert_eq!(
        store.get(&plan).await.unwrap().str_field("status"),
        Some("Converted")
    );
}

#[tokio::test]
async fn converting_missing_plan_is_not_found() {
    let workflow = workflow();
    let err = workflow.convert_plan("plan-404").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(workflow
        .store()
        .list("campaigns", None)
        .await
        .unwrap()
        .is_empty());
}
