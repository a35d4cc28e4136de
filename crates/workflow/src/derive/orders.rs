//! Plan -> Sales Order entry + Purchase Order entry.

use async_trait::async_trait;
use ooh_storage::{
    run_transaction, Document, DocumentRef, DocumentStore, Patch, RetryPolicy, SetMode,
    TransactionBody,
};
use serde_json::Value;

use super::marker::{marker_patch, marker_ref, marker_version};
use super::{DerivationJob, DerivationOutcome};
use crate::config::Collections;
use crate::error::WorkflowError;
use crate::trigger::Transition;

pub const PLAN_ORDERS_JOB: &str = "plan-orders";

const SALES_ORDER_STATUS: &str = "approved";
const PURCHASE_ORDER_STATUS: &str = "generated";

/// Creates one Sales Order entry and one Purchase Order entry from a
/// confirmed plan. The plan's marker records the version derived from, so
/// each confirmation is derived once however often it is delivered.
#[derive(Debug, Clone)]
pub struct PlanOrdersJob {
    collections: Collections,
    policy: RetryPolicy,
}

impl PlanOrdersJob {
    pub fn new(collections: Collections, policy: RetryPolicy) -> Self {
        Self {
            collections,
            policy,
        }
    }

    pub fn marker_for(&self, source: &DocumentRef) -> DocumentRef {
        marker_ref(&self.collections.markers, PLAN_ORDERS_JOB, source)
    }
}

#[async_trait]
impl<S: DocumentStore> DerivationJob<S> for PlanOrdersJob {
    fn name(&self) -> &str {
        PLAN_ORDERS_JOB
    }

    async fn derive(
        &self,
        store: &S,
        transition: &Transition,
    ) -> Result<DerivationOutcome, WorkflowError> {
        let entries = OrderEntries::from_plan(&transition.after)?;
        let body = OrdersBody {
            collections: &self.collections,
            marker: self.marker_for(&transition.source),
            transition,
            entries,
        };
        run_transaction(store, &self.policy, &body).await
    }
}

/// Field values copied from the plan onto both entries.
#[derive(Debug, Clone)]
struct OrderEntries {
    sales_order: Patch,
    purchase_order: Patch,
}

impl OrderEntries {
    fn from_plan(plan: &Document) -> Result<Self, WorkflowError> {
        let required = |name: &str| -> Result<Value, WorkflowError> {
            match plan.fields.get(name) {
                Some(Value::Null) | None => Err(WorkflowError::invalid(
                    &plan.path,
                    format!("missing field {name}"),
                )),
                Some(value) => Ok(value.clone()),
            }
        };
        let amount = |name: &str| -> Result<Value, WorkflowError> {
            let value = plan
                .fields
                .get("costSummary")
                .and_then(|summary| summary.get(name))
                .ok_or_else(|| {
                    WorkflowError::invalid(&plan.path, format!("missing field costSummary.{name}"))
                })?;
            if !value.is_number() {
                return Err(WorkflowError::invalid(
                    &plan.path,
                    format!("costSummary.{name} must be a number, got {value}"),
                ));
            }
            Ok(value.clone())
        };

        let plan_id = plan.path.id.as_str();
        let customer_id = required("customerId")?;
        let employee_id = required("employeeId")?;
        let total_before_tax = amount("totalBeforeTax")?;

        let sales_order = Patch::new()
            .set("planId", plan_id)
            .set("customerId", customer_id.clone())
            .set("employeeId", employee_id.clone())
            .set("displayName", required("displayName")?)
            .set("fromDate", required("startDate")?)
            .set("toDate", required("endDate")?)
            .set("status", SALES_ORDER_STATUS)
            .set("invoiceAmount", total_before_tax.clone())
            .set("invoiceAmountWithTax", amount("grandTotal")?)
            .server_timestamp("createdAt");
        let purchase_order = Patch::new()
            .set("planId", plan_id)
            .set("customerId", customer_id)
            .set("employeeId", employee_id)
            .set("poStatus", PURCHASE_ORDER_STATUS)
            .set("poAmount", total_before_tax)
            .server_timestamp("createdAt");

        Ok(Self {
            sales_order,
            purchase_order,
        })
    }
}

struct OrdersBody<'a> {
    collections: &'a Collections,
    marker: DocumentRef,
    transition: &'a Transition,
    entries: OrderEntries,
}

#[async_trait]
impl<'a, S: DocumentStore> TransactionBody<S> for OrdersBody<'a> {
    type Output = DerivationOutcome;
    type Error = WorkflowError;

    async fn run(
        &self,
        store: &S,
        snapshot: &mut S::Snapshot,
    ) -> Result<DerivationOutcome, WorkflowError> {
        if let Some(marker) = store.get_in(snapshot, &self.marker).await? {
            let derived = marker_version(&marker).ok_or_else(|| {
                WorkflowError::invalid(&self.marker, "sourceVersion must be an integer")
            })?;
            // Versions at or below the recorded one belong to a confirmation
            // that was already derived.
            if derived >= self.transition.version() {
                return Ok(DerivationOutcome::AlreadyDerived {
                    marker: self.marker.clone(),
                });
            }
        }

        let sales_order = store
            .create_in(
                snapshot,
                &self.collections.sales_orders,
                self.entries.sales_order.clone(),
            )
            .await?;
        let purchase_order = store
            .create_in(
                snapshot,
                &self.collections.purchase_orders,
                self.entries.purchase_order.clone(),
            )
            .await?;
        let outputs = vec![sales_order, purchase_order];

        store
            .set_in(
                snapshot,
                &self.marker,
                marker_patch(
                    PLAN_ORDERS_JOB,
                    &self.transition.source,
                    self.transition.version(),
                    &self.transition.to,
                    &outputs,
                ),
                SetMode::Replace,
            )
            .await?;
        Ok(DerivationOutcome::Derived {
            outputs,
            marker: Some(self.marker.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooh_storage::MemoryStore;
    use serde_json::json;

    async fn confirmed_plan(store: &MemoryStore) -> Transition {
        let path = DocumentRef::new("plans", "plan-1");
        let fields = json!({
            "status": "confirmed",
            "customerId": "cust-9",
            "employeeId": "emp-4",
            "displayName": "Metro Q3",
            "startDate": "2026-07-01",
            "endDate": "2026-09-30",
            "costSummary": { "totalBeforeTax": 390500, "grandTotal": 460790 }
        });
        let patch = Patch::from(fields.as_object().unwrap().clone());
        store.set(&path, patch, SetMode::Replace).await.unwrap();
        let after = store.get(&path).await.unwrap();
        Transition {
            source: path,
            from: Some("draft".to_string()),
            to: "confirmed".to_string(),
            after,
            event_id: "1-0".to_string(),
        }
    }

    fn job() -> PlanOrdersJob {
        PlanOrdersJob::new(Collections::default(), RetryPolicy::default())
    }

    #[tokio::test]
    async fn derives_both_entries_with_mapped_fields() {
        let store = MemoryStore::new();
        let transition = confirmed_plan(&store).await;

        let outcome = job().derive(&store, &transition).await.unwrap();
        let outputs = outcome.outputs();
        assert_eq!(outputs.len(), 2);

        let so = store.get(&outputs[0]).await.unwrap();
        assert_eq!(so.path.collection, "salesOrderEntries");
        assert_eq!(so.fields["planId"], json!("plan-1"));
        assert_eq!(so.fields["customerId"], json!("cust-9"));
        assert_eq!(so.fields["fromDate"], json!("2026-07-01"));
        assert_eq!(so.fields["toDate"], json!("2026-09-30"));
        assert_eq!(so.fields["status"], json!("approved"));
        assert_eq!(so.fields["invoiceAmount"], json!(390500));
        assert_eq!(so.fields["invoiceAmountWithTax"], json!(460790));
        assert!(so.str_field("createdAt").is_some());

        let po = store.get(&outputs[1]).await.unwrap();
        assert_eq!(po.path.collection, "purchaseOrderEntries");
        assert_eq!(po.fields["poStatus"], json!("generated"));
        assert_eq!(po.fields["poAmount"], json!(390500));
        assert_eq!(po.fields["employeeId"], json!("emp-4"));
    }

    #[tokio::test]
    async fn marker_records_outputs() {
        let store = MemoryStore::new();
        let transition = confirmed_plan(&store).await;
        let outcome = job().derive(&store, &transition).await.unwrap();

        let marker = job().marker_for(&transition.source);
        let stored = store.get(&marker).await.unwrap();
        assert_eq!(stored.str_field("job"), Some(PLAN_ORDERS_JOB));
        assert_eq!(stored.str_field("source"), Some("plans/plan-1"));
        assert_eq!(stored.fields["sourceVersion"], json!(transition.version()));
        assert_eq!(super::super::marker::marker_outputs(&stored), outcome.outputs());
    }

    #[tokio::test]
    async fn second_run_is_already_derived() {
        let store = MemoryStore::new();
        let transition = confirmed_plan(&store).await;
        job().derive(&store, &transition).await.unwrap();

        let again = job().derive(&store, &transition).await.unwrap();
        assert!(matches!(again, DerivationOutcome::AlreadyDerived { .. }));
        assert_eq!(
            store.list("salesOrderEntries", None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn missing_cost_summary_writes_nothing() {
        let store = MemoryStore::new();
        let mut transition = confirmed_plan(&store).await;
        transition.after.fields.remove("costSummary");

        let err = job().derive(&store, &transition).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDocument { .. }));
        assert!(store.list("salesOrderEntries", None).await.unwrap().is_empty());
        assert!(store.list("derivationMarkers", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn late_event_for_an_older_version_is_skipped() {
        let store = MemoryStore::new();
        let late = confirmed_plan(&store).await;
        store
            .update(&late.source, Patch::new().set("remarks", "site photos added"))
            .await
            .unwrap();
        let mut current = late.clone();
        current.after = store.get(&late.source).await.unwrap();

        job().derive(&store, &current).await.unwrap();
        let outcome = job().derive(&store, &late).await.unwrap();
        assert!(matches!(outcome, DerivationOutcome::AlreadyDerived { .. }));
        assert_eq!(
            store.list("salesOrderEntries", None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn newer_confirmation_derives_again() {
        let store = MemoryStore::new();
        let first = confirmed_plan(&store).await;
        job().derive(&store, &first).await.unwrap();

        let mut second = first.clone();
        second.after.version += 2;
        let outcome = job().derive(&store, &second).await.unwrap();
        assert_eq!(outcome.outputs().len(), 2);

        let marker = store.get(&job().marker_for(&first.source)).await.unwrap();
        assert_eq!(marker_version(&marker), Some(second.version()));
        assert_eq!(
            store.list("salesOrderEntries", None).await.unwrap().len(),
            2
        );
    }
}
