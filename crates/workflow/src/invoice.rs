//! Invoice numbering on top of the sequence allocator.

use std::sync::Arc;

use ooh_storage::{DocumentRef, DocumentStore, RetryPolicy};

use crate::config::{Collections, InvoiceConfig};
use crate::error::WorkflowError;
use crate::sequence::{Allocation, AllocationRequest, SequenceAllocator};

pub const INVOICE_NUMBER_FIELD: &str = "invoiceNumber";
pub const INVOICE_DATE_FIELD: &str = "invoiceDate";

/// Stamps `{ invoiceNumber, invoiceDate }` onto pending invoices.
pub struct InvoiceNumbering<S> {
    allocator: SequenceAllocator<S>,
    invoices: String,
    settings: InvoiceConfig,
}

impl<S: DocumentStore> InvoiceNumbering<S> {
    pub fn new(
        store: Arc<S>,
        collections: &Collections,
        settings: InvoiceConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            allocator: SequenceAllocator::new(store, collections.counters.as_str(), policy),
            invoices: collections.pending_invoices.clone(),
            settings,
        }
    }

    /// Number `pendingInvoices/{invoice_id}`. An invoice that already carries
    /// a number keeps it and consumes no new one.
    pub async fn number_invoice(&self, invoice_id: &str) -> Result<Allocation, WorkflowError> {
        let request = AllocationRequest {
            counter: self.settings.counter.clone(),
            target: DocumentRef::new(self.invoices.as_str(), invoice_id),
            format: self.settings.format(),
            code_field: INVOICE_NUMBER_FIELD.to_string(),
            timestamp_field: INVOICE_DATE_FIELD.to_string(),
            keep_existing: true,
        };
        self.allocator.allocate(&request).await
    }

    pub fn allocator(&self) -> &SequenceAllocator<S> {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooh_storage::{MemoryStore, Patch, SetMode};

    async fn numbering(ids: &[&str]) -> InvoiceNumbering<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for id in ids {
            store
                .set(
                    &DocumentRef::new("pendingInvoices", *id),
                    Patch::new().set("amount", 1200),
                    SetMode::Replace,
                )
                .await
                .unwrap();
        }
        InvoiceNumbering::new(
            store,
            &Collections::default(),
            InvoiceConfig::default(),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn invoices_are_numbered_in_order() {
        let numbering = numbering(&["a", "b"]).await;
        assert_eq!(numbering.number_invoice("a").await.unwrap().code(), "INV-00001");
        assert_eq!(numbering.number_invoice("b").await.unwrap().code(), "INV-00002");
        assert_eq!(numbering.allocator().current("invoiceNumber").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn renumbering_keeps_the_first_number() {
        let numbering = numbering(&["a", "b"]).await;
        numbering.number_invoice("a").await.unwrap();
        let again = numbering.number_invoice("a").await.unwrap();
        assert_eq!(again, Allocation::Existing { code: "INV-00001".to_string() });
        assert_eq!(numbering.number_invoice("b").await.unwrap().code(), "INV-00002");
    }

    #[tokio::test]
    async fn custom_format_applies() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &DocumentRef::new("pendingInvoices", "a"),
                Patch::new(),
                SetMode::Replace,
            )
            .await
            .unwrap();
        let settings = InvoiceConfig {
            counter: "proforma".to_string(),
            prefix: "PI/".to_string(),
            width: 3,
        };
        let numbering =
            InvoiceNumbering::new(store, &Collections::default(), settings, RetryPolicy::default());
        let allocation = numbering.number_invoice("a").await.unwrap();
        assert_eq!(allocation.code(), "PI/001");
        assert_eq!(numbering.allocator().current("proforma").await.unwrap(), 1);
    }
}
