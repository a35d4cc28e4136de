pub mod conformance;
mod error;
mod memory;
mod patch;
mod record;
mod traits;
mod transaction;

pub use error::StoreError;
pub use memory::{MemorySnapshot, MemoryStore, StoreImage, StoredDocument};
pub use patch::{FieldValue, Patch, SetMode};
pub use record::{ChangeEvent, Document, DocumentRef, Fields};
pub use traits::DocumentStore;
pub use transaction::{run_transaction, RetryPolicy, TransactionBody};
