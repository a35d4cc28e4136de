//! Change feed consumer dispatching derivation jobs on status transitions.

use std::future::Future;
use std::sync::Arc;

use ooh_storage::{ChangeEvent, DocumentRef, DocumentStore};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::derive::{DerivationJob, DerivationOutcome};
use crate::error::WorkflowError;
use crate::trigger::StatusTrigger;

struct Registration<S> {
    trigger: StatusTrigger,
    job: Arc<dyn DerivationJob<S>>,
}

/// One job run caused by one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub job: String,
    pub source: DocumentRef,
    pub event_id: String,
    pub outcome: DerivationOutcome,
}

/// What a [`TransitionWatcher::drain`] pass did.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub events: usize,
    pub dispatched: Vec<Dispatch>,
    pub failures: Vec<(String, WorkflowError)>,
    /// Events dropped because the receiver fell behind the feed.
    pub lagged: u64,
}

/// Evaluates registered triggers against change events and runs the job of
/// every trigger that fires.
pub struct TransitionWatcher<S> {
    store: Arc<S>,
    registrations: Vec<Registration<S>>,
}

impl<S: DocumentStore> TransitionWatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            registrations: Vec::new(),
        }
    }

    pub fn register(mut self, trigger: StatusTrigger, job: Arc<dyn DerivationJob<S>>) -> Self {
        self.registrations.push(Registration { trigger, job });
        self
    }

    pub fn triggers(&self) -> impl Iterator<Item = &StatusTrigger> {
        self.registrations.iter().map(|r| &r.trigger)
    }

    /// Run every job whose trigger fires on `event`, in registration order.
    /// The first job failure fails the whole call.
    pub async fn handle(&self, event: &ChangeEvent) -> Result<Vec<Dispatch>, WorkflowError> {
        let mut dispatched = Vec::new();
        for registration in &self.registrations {
            let Some(transition) = registration.trigger.evaluate(event) else {
                continue;
            };
            let job = registration.job.name().to_string();
            match registration.job.derive(self.store.as_ref(), &transition).await {
                Ok(outcome) => {
                    match &outcome {
                        DerivationOutcome::Derived { outputs, .. } => tracing::info!(
                            job = %job,
                            source = %transition.source,
                            version = transition.version(),
                            outputs = outputs.len(),
                            "derivation committed"
                        ),
                        DerivationOutcome::AlreadyDerived { marker } => tracing::warn!(
                            job = %job,
                            source = %transition.source,
                            event_id = %transition.event_id,
                            marker = %marker,
                            "transition already derived, skipping redelivery"
                        ),
                    }
                    dispatched.push(Dispatch {
                        job,
                        source: transition.source,
                        event_id: transition.event_id,
                        outcome,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        job = %job,
                        source = %transition.source,
                        event_id = %transition.event_id,
                        kind = %e.kind(),
                        error = %e,
                        "derivation failed"
                    );
                    return Err(e);
                }
            }
        }
        Ok(dispatched)
    }

    /// Handle every event already buffered on `rx`, without waiting for more.
    /// Failures are collected and do not stop the pass.
    pub async fn drain(&self, rx: &mut broadcast::Receiver<ChangeEvent>) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    report.events += 1;
                    match self.handle(&event).await {
                        Ok(mut dispatched) => report.dispatched.append(&mut dispatched),
                        Err(e) => report.failures.push((event.event_id, e)),
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change feed lagged, events dropped");
                    report.lagged += skipped;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        report
    }

    /// Consume the feed until `shutdown` resolves or the feed closes.
    pub async fn run<F>(&self, mut rx: broadcast::Receiver<ChangeEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        // Logged as errors by `handle`; the sweep retries them.
                        if let Err(e) = self.handle(&event).await {
                            tracing::debug!(
                                event_id = %event.event_id,
                                kind = %e.kind(),
                                "event left for the reconciliation sweep"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("transition watcher stopped");
    }
}
