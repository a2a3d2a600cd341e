//! The persisted record model.
//!
//! One record per key: scalar keys, list meta records, and list item records
//! all share the same shape. Deleted records stay in the bucket file as
//! tombstones so later merges can order the delete against concurrent writes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::time::WallClock;

/// Opaque record identifier, stable across updates to the same key.
///
/// Minted as a v4 UUID on first write. Merge ties on `updated_at` are broken
/// by lexicographic comparison of the id string, so ordering must match the
/// on-disk text exactly.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({:?})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag carried by every record; drives codec and merge behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Binary,
    Object,
    Array,
    /// Only list meta records carry this; items carry their payload's type.
    List,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Binary => "binary",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::List => "list",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker on a list item that lost a merge and was re-added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictLoser {
    pub winner_id: String,
}

/// The universal unit of persisted state.
///
/// Field names are fixed by the bucket file format: `id`, `key`, `type`,
/// `createdAt`, `updatedAt`, `deletedAt`, `conflictLoser`, `value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub created_at: WallClock,
    #[serde(default)]
    pub updated_at: WallClock,
    #[serde(default)]
    pub deleted_at: Option<WallClock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_loser: Option<ConflictLoser>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Record {
    /// Fresh record for a first write.
    pub fn create(
        key: impl Into<String>,
        value_type: ValueType,
        value: serde_json::Value,
        now: WallClock,
    ) -> Self {
        Self {
            id: RecordId::mint(),
            key: key.into(),
            value_type,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            conflict_loser: None,
            value,
        }
    }

    /// A key is live iff it has not been tombstoned.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Overwrite the payload, preserving id and creation time. Revives a
    /// tombstoned record.
    pub fn update(&mut self, value_type: ValueType, value: serde_json::Value, now: WallClock) {
        self.value_type = value_type;
        self.value = value;
        self.updated_at = now;
        self.deleted_at = None;
    }

    /// Turn the record into a tombstone. A delete is a write, so
    /// `updated_at` advances with it.
    pub fn delete(&mut self, now: WallClock) {
        self.updated_at = now;
        self.deleted_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_field_names_are_wire_exact() {
        let mut record = Record::create(
            "color",
            ValueType::String,
            serde_json::Value::String("teal".into()),
            WallClock(1_000),
        );
        record.id = RecordId::new("00000000-0000-4000-8000-000000000001");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "00000000-0000-4000-8000-000000000001",
                "key": "color",
                "type": "string",
                "createdAt": 1_000,
                "updatedAt": 1_000,
                "deletedAt": null,
                "value": "teal",
            })
        );
    }

    #[test]
    fn conflict_loser_round_trips() {
        let mut record = Record::create(
            "list:todos:item:6b0c0f1e-0000-4000-8000-000000000002",
            ValueType::Object,
            serde_json::json!({"title": "draft"}),
            WallClock(2_000),
        );
        record.conflict_loser = Some(ConflictLoser {
            winner_id: "6b0c0f1e-0000-4000-8000-000000000001".into(),
        });

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"conflictLoser\":{\"winnerId\":"));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_timestamps_parse_as_zero() {
        let raw = r#"{"id":"x","key":"k","type":"string","value":"v"}"#;
        let record: Record = serde_json::from_str(raw).unwrap();
        assert_eq!(record.created_at, WallClock(0));
        assert_eq!(record.updated_at, WallClock(0));
        assert!(record.is_live());
    }

    #[test]
    fn delete_advances_updated_at() {
        let mut record = Record::create(
            "k",
            ValueType::String,
            serde_json::Value::String("v".into()),
            WallClock(10),
        );
        record.delete(WallClock(20));
        assert!(!record.is_live());
        assert_eq!(record.updated_at, WallClock(20));
        assert_eq!(record.deleted_at, Some(WallClock(20)));

        record.update(
            ValueType::String,
            serde_json::Value::String("w".into()),
            WallClock(30),
        );
        assert!(record.is_live());
        assert_eq!(record.created_at, WallClock(10));
    }
}
