//! Plan -> Campaign conversion.

use async_trait::async_trait;
use ooh_storage::{run_transaction, DocumentRef, DocumentStore, Patch, RetryPolicy, TransactionBody};

use crate::config::{Collections, PlanConfig};
use crate::error::WorkflowError;
use crate::status::status_patch;

/// Copies a plan into a new campaign and marks the plan converted, in one
/// transaction.
#[derive(Debug, Clone)]
pub struct CampaignConversion {
    collections: Collections,
    plan: PlanConfig,
    policy: RetryPolicy,
}

impl CampaignConversion {
    pub fn new(collections: Collections, plan: PlanConfig, policy: RetryPolicy) -> Self {
        Self {
            collections,
            plan,
            policy,
        }
    }

    /// Convert `plans/{plan_id}`. Returns the new campaign's path.
    pub async fn convert<S: DocumentStore>(
        &self,
        store: &S,
        plan_id: &str,
    ) -> Result<DocumentRef, WorkflowError> {
        let body = ConvertBody {
            config: self,
            plan: DocumentRef::new(self.collections.plans.as_str(), plan_id),
        };
        let campaign = run_transaction(store, &self.policy, &body).await?;
        tracing::info!(plan = %body.plan, campaign = %campaign, "plan converted to campaign");
        Ok(campaign)
    }
}

struct ConvertBody<'a> {
    config: &'a CampaignConversion,
    plan: DocumentRef,
}

#[async_trait]
impl<'a, S: DocumentStore> TransactionBody<S> for ConvertBody<'a> {
    type Output = DocumentRef;
    type Error = WorkflowError;

    async fn run(&self, store: &S, snapshot: &mut S::Snapshot) -> Result<DocumentRef, WorkflowError> {
        let plan_settings = &self.config.plan;
        let plan = store
            .get_in(snapshot, &self.plan)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                path: self.plan.path(),
            })?;
        if plan.str_field(&plan_settings.status_field) == Some(plan_settings.converted_status.as_str())
        {
            return Err(WorkflowError::AlreadyConverted {
                plan: self.plan.path(),
            });
        }

        let campaign = store
            .create_in(
                snapshot,
                &self.config.collections.campaigns,
                Patch::from(plan.fields.clone()),
            )
            .await?;
        store
            .update_in(
                snapshot,
                &self.plan,
                status_patch(plan_settings, &plan, &plan_settings.converted_status),
            )
            .await?;
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooh_storage::{MemoryStore, SetMode};
    use serde_json::json;

    fn conversion() -> CampaignConversion {
        CampaignConversion::new(
            Collections::default(),
            PlanConfig::default(),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn copies_fields_and_marks_plan_converted() {
        let store = MemoryStore::new();
        let plan = DocumentRef::new("plans", "plan-1");
        store
            .set(
                &plan,
                Patch::new()
                    .set("displayName", "X")
                    .set("status", "Active")
                    .set("sites", json!([{ "code": "BLR-01" }])),
                SetMode::Replace,
            )
            .await
            .unwrap();

        let campaign = conversion().convert(&store, "plan-1").await.unwrap();
        assert_eq!(campaign.collection, "campaigns");
        assert_ne!(campaign.id, "plan-1");

        let stored = store.get(&campaign).await.unwrap();
        assert_eq!(stored.str_field("displayName"), Some("X"));
        assert_eq!(stored.fields["sites"], json!([{ "code": "BLR-01" }]));
        let converted = store.get(&plan).await.unwrap();
        assert_eq!(converted.str_field("status"), Some("Converted"));
        assert_eq!(converted.fields["statusVersion"], json!(converted.version));
    }

    #[tokio::test]
    async fn missing_plan_creates_nothing() {
        let store = MemoryStore::new();
        let err = conversion().convert(&store, "nope").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        assert!(store.list("campaigns", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn converted_plan_is_not_converted_twice() {
        let store = MemoryStore::new();
        let plan = DocumentRef::new("plans", "plan-1");
        store
            .set(&plan, Patch::new().set("status", "Active"), SetMode::Replace)
            .await
            .unwrap();
        conversion().convert(&store, "plan-1").await.unwrap();

        let err = conversion().convert(&store, "plan-1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyConverted { .. }));
        assert_eq!(store.list("campaigns", None).await.unwrap().len(), 1);
    }
}
