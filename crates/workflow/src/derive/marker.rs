//! Derivation markers.
//!
//! One marker per `(job, source)` records the source version the job last
//! derived from. It is read first and rewritten by the same transaction that
//! creates the outputs. A transition whose version is at or below the
//! recorded one has already been derived, which makes redelivered and late
//! events no-ops.

use ooh_storage::{Document, DocumentRef, Patch};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const SOURCE_VERSION_FIELD: &str = "sourceVersion";

/// Marker id for `(job, source)`: hex SHA-256 of both joined with a NUL.
pub fn marker_id(job: &str, source: &DocumentRef) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.path().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn marker_ref(collection: &str, job: &str, source: &DocumentRef) -> DocumentRef {
    DocumentRef::new(collection, marker_id(job, source))
}

/// Marker fields: `{ job, source, sourceVersion, status, outputs, derivedAt }`.
pub fn marker_patch(
    job: &str,
    source: &DocumentRef,
    version: i64,
    status: &str,
    outputs: &[DocumentRef],
) -> Patch {
    let outputs: Vec<Value> = outputs.iter().map(|o| Value::String(o.path())).collect();
    Patch::new()
        .set("job", job)
        .set("source", source.path())
        .set(SOURCE_VERSION_FIELD, version)
        .set("status", status)
        .set("outputs", outputs)
        .server_timestamp("derivedAt")
}

/// Source version recorded on a marker; `None` when missing or not an integer.
pub fn marker_version(marker: &Document) -> Option<i64> {
    marker.fields.get(SOURCE_VERSION_FIELD).and_then(Value::as_i64)
}

/// Output paths recorded on a marker document.
pub fn marker_outputs(marker: &Document) -> Vec<DocumentRef> {
    marker
        .fields
        .get("outputs")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(DocumentRef::parse)
                .collect()
        })
        .unwrap_or_default()
}
