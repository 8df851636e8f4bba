//! Caller-side document abstraction handed to replication filters and
//! conflict resolvers.

use serde_json::{Map, Value};

use crate::channel::{DocumentState, EncodedDocument};

/// A document revision as seen by user callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    revision_id: Option<String>,
    sequence: u64,
    properties: Map<String, Value>,
}

impl Document {
    /// Create a new, unsaved document
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision_id: None,
            sequence: 0,
            properties: Map::new(),
        }
    }

    /// Decode a wire-level snapshot
    pub fn from_state(state: &DocumentState) -> Self {
        Self {
            id: state.id.clone(),
            revision_id: state.revision_id.clone(),
            sequence: state.sequence,
            properties: state.properties.clone(),
        }
    }

    /// Encode into a fresh wire-level state
    pub fn to_encoded(&self) -> EncodedDocument {
        EncodedDocument {
            id: self.id.clone(),
            properties: self.properties.clone(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn revision_id(&self) -> Option<&str> {
        self.revision_id.as_deref()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Generation number of the revision id (`"3-abc"` → 3)
    pub fn generation(&self) -> Option<u64> {
        self.revision_id
            .as_deref()
            .and_then(|rev| rev.split_once('-'))
            .and_then(|(generation, _)| generation.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SnapshotId;
    use serde_json::json;

    fn state() -> DocumentState {
        let mut properties = Map::new();
        properties.insert("name".into(), json!("Ada"));
        DocumentState {
            snapshot_id: SnapshotId(3),
            id: "user::1".into(),
            revision_id: Some("4-beef".into()),
            sequence: 17,
            properties,
        }
    }

    #[test]
    fn test_from_state() {
        let doc = Document::from_state(&state());
        assert_eq!(doc.id(), "user::1");
        assert_eq!(doc.revision_id(), Some("4-beef"));
        assert_eq!(doc.sequence(), 17);
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        assert_eq!(doc.generation(), Some(4));
    }

    #[test]
    fn test_to_encoded_carries_properties() {
        let doc = Document::new("merged").with_property("count", 2);
        let encoded = doc.to_encoded();
        assert_eq!(encoded.id, "merged");
        assert_eq!(encoded.properties.get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_generation_of_unsaved_document() {
        assert_eq!(Document::new("x").generation(), None);
    }
}
