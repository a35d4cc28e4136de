//! Edge-triggered status transitions.

use ooh_storage::{ChangeEvent, Document, DocumentRef};

/// Fires when a status field moves onto a target value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTrigger {
    pub collection: String,
    pub field: String,
    pub target: String,
}

/// A transition observed on the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub source: DocumentRef,
    /// Status before the write; `None` when absent or not a string.
    pub from: Option<String>,
    pub to: String,
    /// The source document as committed by the triggering write.
    pub after: Document,
    pub event_id: String,
}

impl Transition {
    pub fn version(&self) -> i64 {
        self.after.version
    }
}

impl StatusTrigger {
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            target: target.into(),
        }
    }

    /// Strict edge: the field was not the target before and is now.
    pub fn fires(&self, before: Option<&str>, after: Option<&str>) -> bool {
        before != Some(self.target.as_str()) && after == Some(self.target.as_str())
    }

    /// Evaluate an update event. Creations and deletions never fire.
    pub fn evaluate(&self, event: &ChangeEvent) -> Option<Transition> {
        if event.path.collection != self.collection {
            return None;
        }
        let (before, after) = match (&event.before, &event.after) {
            (Some(before), Some(after)) => (before, after),
            _ => return None,
        };
        let from = before.str_field(&self.field);
        let to = after.str_field(&self.field);
        if !self.fires(from, to) {
            return None;
        }
        Some(Transition {
            source: event.path.clone(),
            from: from.map(str::to_string),
            to: self.target.clone(),
            after: after.clone(),
            event_id: event.event_id.clone(),
        })
    }
}
