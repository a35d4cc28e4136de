//! Reconciliation sweep for confirmed plans whose orders were never derived.
//!
//! Change events can be lost (the host was down, the feed lagged) and a job
//! can fail. The sweep finds plans sitting in the confirmed status whose
//! current confirmation has not been derived and runs the job against their
//! current state.

use std::sync::Arc;

use ooh_storage::{Document, DocumentStore, StoreError};
use serde::Serialize;
use serde_json::Value;

use crate::config::PlanConfig;
use crate::derive::marker::marker_version;
use crate::derive::{DerivationJob, PlanOrdersJob};
use crate::error::WorkflowError;
use crate::status::status_version;
use crate::trigger::Transition;

/// Event id recorded on transitions synthesized by the sweep.
pub const SWEEP_EVENT_ID: &str = "sweep";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Plans in the confirmed status.
    pub scanned: usize,
    /// Confirmed plans whose current confirmation has no orders.
    pub missing: Vec<String>,
    /// Plans whose orders were derived by this sweep.
    pub repaired: Vec<String>,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub source: String,
    pub kind: String,
    pub error: String,
}

pub struct Reconciler<S> {
    store: Arc<S>,
    plans: String,
    plan: PlanConfig,
    job: PlanOrdersJob,
}

impl<S: DocumentStore> Reconciler<S> {
    pub fn new(
        store: Arc<S>,
        plans: impl Into<String>,
        plan: PlanConfig,
        job: PlanOrdersJob,
    ) -> Self {
        Self {
            store,
            plans: plans.into(),
            plan,
            job,
        }
    }

    /// Whether the confirmation `plan` is currently in was derived.
    ///
    /// The status version stamp names the write that entered the confirmed
    /// status; the marker must record that version or a later one. Plans
    /// confirmed by writers that do not stamp count as derived once any
    /// marker exists.
    async fn is_derived(&self, plan: &Document) -> Result<bool, WorkflowError> {
        let marker = match self.store.get(&self.job.marker_for(&plan.path)).await {
            Ok(marker) => marker,
            Err(StoreError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let derived = marker_version(&marker).unwrap_or(i64::MIN);
        Ok(match status_version(plan, &self.plan) {
            Some(entered) => derived >= entered,
            None => true,
        })
    }

    /// Scan confirmed plans; with `dry_run` only report what is missing.
    pub async fn sweep(&self, dry_run: bool) -> Result<SweepReport, WorkflowError> {
        let confirmed = Value::String(self.plan.confirmed_status.clone());
        let plans = self
            .store
            .list(&self.plans, Some((self.plan.status_field.as_str(), &confirmed)))
            .await?;

        let mut report = SweepReport {
            scanned: plans.len(),
            ..SweepReport::default()
        };
        for plan in plans {
            if self.is_derived(&plan).await? {
                continue;
            }
            let source = plan.path.clone();
            report.missing.push(source.path());
            if dry_run {
                continue;
            }

            // Derived at the current version, which is at or after the
            // confirmation, so a late event for it is skipped.
            let transition = Transition {
                source: source.clone(),
                from: None,
                to: self.plan.confirmed_status.clone(),
                after: plan,
                event_id: SWEEP_EVENT_ID.to_string(),
            };
            match self.job.derive(self.store.as_ref(), &transition).await {
                Ok(outcome) => {
                    tracing::info!(
                        source = %source,
                        outputs = outcome.outputs().len(),
                        "sweep derived missing orders"
                    );
                    report.repaired.push(source.path());
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "sweep derivation failed");
                    report.failures.push(SweepFailure {
                        source: source.path(),
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            scanned = report.scanned,
            missing = report.missing.len(),
            repaired = report.repaired.len(),
            failed = report.failures.len(),
            dry_run,
            "reconciliation sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Collections;
    use ooh_storage::{DocumentRef, MemoryStore, Patch, RetryPolicy, SetMode};
    use serde_json::json;

    fn reconciler(store: Arc<MemoryStore>) -> Reconciler<MemoryStore> {
        let collections = Collections::default();
        let plans = collections.plans.clone();
        Reconciler::new(
            store,
            plans,
            PlanConfig::default(),
            PlanOrdersJob::new(collections, RetryPolicy::default()),
        )
    }

    async fn plan(store: &MemoryStore, id: &str, status: &str, complete: bool) {
        let mut fields = json!({ "status": status });
        if complete {
            fields = json!({
                "status": status,
                "customerId": "c",
                "employeeId": "e",
                "displayName": id,
                "startDate": "2026-01-01",
                "endDate": "2026-03-31",
                "costSummary": { "totalBeforeTax": 10, "grandTotal": 12 }
            });
        }
        store
            .set(
                &DocumentRef::new("plans", id),
                Patch::from(fields.as_object().unwrap().clone()),
                SetMode::Replace,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let store = Arc::new(MemoryStore::new());
        plan(&store, "p1", "confirmed", true).await;
        plan(&store, "p2", "draft", true).await;

        let report = reconciler(store.clone()).sweep(true).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.missing, vec!["plans/p1".to_string()]);
        assert!(report.repaired.is_empty());
        assert!(store.list("salesOrderEntries", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_repairs_once() {
        let store = Arc::new(MemoryStore::new());
        plan(&store, "p1", "confirmed", true).await;
        plan(&store, "p2", "confirmed", false).await;
        let reconciler = reconciler(store.clone());

        let report = reconciler.sweep(false).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.repaired, vec!["plans/p1".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "plans/p2");
        assert_eq!(report.failures[0].kind, "invalid_document");

        let again = reconciler.sweep(false).await.unwrap();
        assert_eq!(again.missing, vec!["plans/p2".to_string()]);
        assert!(again.repaired.is_empty());
        assert_eq!(store.list("salesOrderEntries", None).await.unwrap().len(), 1);
    }
}
