//! Conformance test suite for `DocumentStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `DocumentStore` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Snapshot isolation**: staged writes invisible until commit, aborted
//!   writes discarded, reads rejected after the first write
//! - **Atomic commit**: all-or-nothing semantics for multi-document snapshots
//! - **Version validation / OCC**: read-set conflicts fail the commit
//! - **Error handling**: correct error variants for missing documents
//! - **Concurrency**: racing read-modify-write transactions under
//!   `run_transaction` never lose an increment
//! - **Change feed**: one event per committed write with before/after state
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use ooh_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn my_backend_conformance() {
//!     let report = run_conformance_suite(|| async { MyStore::connect_test().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod feed;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use crate::{DocumentRef, DocumentStore, Patch, SetMode};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "staged_write_invisible_before_commit").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);
    results.extend(feed::run_feed_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn plan_ref(id: &str) -> DocumentRef {
    DocumentRef::new("plans", id)
}

/// Commit a single `{status}` document outside any test-specific snapshot.
async fn seed_status<S: DocumentStore>(
    s: &S,
    path: &DocumentRef,
    status: &str,
) -> Result<(), String> {
    s.set(path, Patch::new().set("status", status), SetMode::Replace)
        .await
        .map_err(|e| format!("seed {path}: {e}"))
}

async fn status_of<S: DocumentStore>(s: &S, path: &DocumentRef) -> Result<String, String> {
    let doc = s.get(path).await.map_err(|e| format!("get {path}: {e}"))?;
    doc.str_field("status")
        .map(str::to_string)
        .ok_or_else(|| format!("{path} has no string status"))
}
