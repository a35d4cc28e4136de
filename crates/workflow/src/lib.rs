//! Workflow core for OOH plans and invoices: transactional invoice numbering,
//! status-driven order derivation and plan to campaign conversion on top of
//! any [`DocumentStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use ooh_storage::{DocumentStore, MemoryStore};
//! use ooh_workflow::{Workflow, WorkflowConfig};
//!
//! # async fn demo() -> Result<(), ooh_workflow::WorkflowError> {
//! let workflow = Workflow::new(Arc::new(MemoryStore::new()), WorkflowConfig::default());
//! let watcher = workflow.watcher();
//! let mut feed = workflow.store().subscribe();
//! let code = workflow.number_invoice("inv-1").await?;
//! let report = watcher.drain(&mut feed).await;
//! # let _ = (code, report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod derive;
mod error;
pub mod invoice;
pub mod reconcile;
pub mod sequence;
pub mod status;
pub mod trigger;
pub mod watcher;

use std::sync::Arc;

use ooh_storage::{DocumentRef, DocumentStore};

pub use config::{ConfigError, WorkflowConfig};
pub use derive::{CampaignConversion, DerivationJob, DerivationOutcome, PlanOrdersJob};
pub use error::{ErrorKind, WorkflowError};
pub use invoice::InvoiceNumbering;
pub use reconcile::{Reconciler, SweepReport};
pub use sequence::{Allocation, AllocationRequest, SequenceAllocator, SequenceFormat};
pub use status::{StatusChange, StatusWriter};
pub use trigger::{StatusTrigger, Transition};
pub use watcher::{Dispatch, DrainReport, TransitionWatcher};

/// Entry point wiring every component to one shared store client.
pub struct Workflow<S> {
    store: Arc<S>,
    config: WorkflowConfig,
}

impl<S: DocumentStore> Workflow<S> {
    pub fn new(store: Arc<S>, config: WorkflowConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn allocator(&self) -> SequenceAllocator<S> {
        SequenceAllocator::new(
            self.store.clone(),
            self.config.collections.counters.as_str(),
            self.config.transaction.clone(),
        )
    }

    pub fn invoices(&self) -> InvoiceNumbering<S> {
        InvoiceNumbering::new(
            self.store.clone(),
            &self.config.collections,
            self.config.invoice.clone(),
            self.config.transaction.clone(),
        )
    }

    pub fn plan_orders(&self) -> PlanOrdersJob {
        PlanOrdersJob::new(
            self.config.collections.clone(),
            self.config.transaction.clone(),
        )
    }

    pub fn campaigns(&self) -> CampaignConversion {
        CampaignConversion::new(
            self.config.collections.clone(),
            self.config.plan.clone(),
            self.config.transaction.clone(),
        )
    }

    /// Trigger on plans entering the confirmed status.
    pub fn confirmed_trigger(&self) -> StatusTrigger {
        StatusTrigger::new(
            self.config.collections.plans.as_str(),
            self.config.plan.status_field.as_str(),
            self.config.plan.confirmed_status.as_str(),
        )
    }

    /// A watcher with Plan -> Orders registered on the confirmed trigger.
    pub fn watcher(&self) -> TransitionWatcher<S> {
        TransitionWatcher::new(self.store.clone())
            .register(self.confirmed_trigger(), Arc::new(self.plan_orders()))
    }

    pub fn status_writer(&self) -> StatusWriter {
        StatusWriter::new(self.config.plan.clone(), self.config.transaction.clone())
    }

    pub fn reconciler(&self) -> Reconciler<S> {
        Reconciler::new(
            self.store.clone(),
            self.config.collections.plans.as_str(),
            self.config.plan.clone(),
            self.plan_orders(),
        )
    }

    /// Assign the next invoice number to `pendingInvoices/{invoice_id}`.
    ///
    /// An invoice that already carries an `invoiceNumber` is returned as
    /// [`Allocation::Existing`] with its number unchanged, and the counter is
    /// not advanced.
    pub async fn number_invoice(&self, invoice_id: &str) -> Result<Allocation, WorkflowError> {
        self.invoices().number_invoice(invoice_id).await
    }

    pub async fn convert_plan(&self, plan_id: &str) -> Result<DocumentRef, WorkflowError> {
        self.campaigns().convert(self.store.as_ref(), plan_id).await
    }

    /// Write the status of `{collection}/{id}`, stamping the status version
    /// when the value changes. Derivations run off the change feed.
    pub async fn set_status(
        &self,
        collection: &str,
        id: &str,
        status: &str,
    ) -> Result<StatusChange, WorkflowError> {
        self.status_writer()
            .set_status(self.store.as_ref(), &DocumentRef::new(collection, id), status)
            .await
    }

    /// Run Plan -> Orders for an observed transition.
    pub async fn derive_orders(
        &self,
        transition: &Transition,
    ) -> Result<DerivationOutcome, WorkflowError> {
        self.plan_orders()
            .derive(self.store.as_ref(), transition)
            .await
    }
}
