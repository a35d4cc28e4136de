use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::record::Fields;

/// A value to write into a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Resolved to the store's commit time (RFC 3339, UTC).
    ServerTimestamp,
}

/// How `set_in` treats fields already present on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Replace the whole field map.
    #[default]
    Replace,
    /// Keep fields not named in the patch.
    Merge,
}

/// A set of top-level field writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, FieldValue>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from any serializable struct or map. The value must
    /// serialize to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self::from(map)),
            Ok(other) => Err(StoreError::Backend(format!(
                "patch must serialize to an object, got {other}"
            ))),
            Err(e) => Err(StoreError::Backend(format!("patch serialization: {e}"))),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.into(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::ServerTimestamp);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Resolve sentinels against `now` and write every field into `target`.
    pub fn apply_to(&self, target: &mut Fields, now: &str) {
        for (name, value) in &self.fields {
            let resolved = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => Value::String(now.to_string()),
            };
            target.insert(name.clone(), resolved);
        }
    }
}

impl From<Fields> for Patch {
    fn from(map: Fields) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Value(v)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_resolves_server_timestamp() {
        let patch = Patch::new()
            .set("nextNumber", 3)
            .server_timestamp("invoiceDate");
        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!("pending"));
        patch.apply_to(&mut fields, "2026-01-01T00:00:00Z");

        assert_eq!(fields["status"], json!("pending"));
        assert_eq!(fields["nextNumber"], json!(3));
        assert_eq!(fields["invoiceDate"], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn from_serialize_rejects_non_objects() {
        assert!(Patch::from_serialize(&42).is_err());
        let patch = Patch::from_serialize(&json!({"a": 1})).unwrap();
        assert!(!patch.is_empty());
    }
}
