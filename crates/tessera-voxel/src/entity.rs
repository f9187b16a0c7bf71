//! Schema-less entity documents attached to chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted entity. Type-specific fields are kept as raw JSON so the
/// chunk subsystem never needs to understand them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity type key used by the entity system to pick a spawner.
    #[serde(rename = "type")]
    pub kind: String,
    /// Last-update timestamp, in ticks.
    pub timestamp: u64,
    pub id: u64,
    /// Everything else.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(kind: impl Into<String>, id: u64, timestamp: u64) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            id,
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// The per-chunk entity document as persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    pub entities: Vec<EntityRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_specific_fields_are_flattened() {
        let record = EntityRecord::new("sheep", 9, 120).with_field("wool", json!("white"));
        let text = serde_json::to_string(&record).unwrap();
        assert!(text.contains("\"type\":\"sheep\""));
        assert!(text.contains("\"wool\":\"white\""));

        let back: EntityRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_unknown_fields_survive() {
        let text = r#"{"type":"cart","timestamp":1,"id":2,"rails":[1,2,3],"speed":0.5}"#;
        let record: EntityRecord = serde_json::from_str(text).unwrap();
        assert_eq!(record.kind, "cart");
        assert_eq!(record.fields.get("rails"), Some(&json!([1, 2, 3])));
    }
}
