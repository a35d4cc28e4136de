//! Derivation jobs: documents built from a source document at the moment it
//! reached a status.

mod campaign;
pub mod marker;
mod orders;

pub use campaign::CampaignConversion;
pub use orders::{PlanOrdersJob, PLAN_ORDERS_JOB};

use async_trait::async_trait;
use ooh_storage::{DocumentRef, DocumentStore};

use crate::error::WorkflowError;
use crate::trigger::Transition;

/// Result of running a derivation job once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationOutcome {
    /// Outputs were committed, together with `marker` when the job keeps one.
    Derived {
        outputs: Vec<DocumentRef>,
        marker: Option<DocumentRef>,
    },
    /// This transition was derived before; nothing was written.
    AlreadyDerived { marker: DocumentRef },
}

impl DerivationOutcome {
    pub fn outputs(&self) -> &[DocumentRef] {
        match self {
            DerivationOutcome::Derived { outputs, .. } => outputs,
            DerivationOutcome::AlreadyDerived { .. } => &[],
        }
    }
}

/// A job dispatched by the watcher when a trigger fires.
///
/// Implementations run their writes in one transaction so a failure leaves
/// no partial output behind.
#[async_trait]
pub trait DerivationJob<S: DocumentStore>: Send + Sync {
    fn name(&self) -> &str;

    async fn derive(
        &self,
        store: &S,
        transition: &Transition,
    ) -> Result<DerivationOutcome, WorkflowError>;
}
