use std::fmt;

use serde::{Deserialize, Serialize};

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Address of a document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parse a `collection/id` path.
    pub fn parse(path: &str) -> Option<Self> {
        let (collection, id) = path.split_once('/')?;
        if collection.is_empty() || id.is_empty() || id.contains('/') {
            return None;
        }
        Some(Self::new(collection, id))
    }

    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A committed document as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocumentRef,
    pub fields: Fields,
    /// 1 after creation, +1 per committed write. An absent document is
    /// treated as version 0 by snapshot validation.
    pub version: i64,
    /// RFC 3339 timestamp string.
    pub create_time: String,
    /// RFC 3339 timestamp string.
    pub update_time: String,
}

impl Document {
    /// String value of a top-level field, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// One committed write, as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique per write: `<commit sequence>-<index within commit>`.
    pub event_id: String,
    pub path: DocumentRef,
    /// None when the write created the document.
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl ChangeEvent {
    pub fn is_update(&self) -> bool {
        self.before.is_some() && self.after.is_some()
    }
}
