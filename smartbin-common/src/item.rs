//! Item event model
//!
//! An `Item` is one enriched classification, the unit that flows from the
//! detector through the ingestion endpoint to every dashboard subscriber.
//! Field names on the wire are fixed: `type`, `class`, `bin`, `weight`,
//! `recyclable`, `image`, `timestamp`. Extra fields (e.g. `confidence`) are
//! tolerated and dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Enriched classification event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Display name of the detected object (e.g. "Plastic Bottle")
    #[serde(rename = "type")]
    pub item_type: String,

    /// Material class (e.g. "Plastic", "Food Waste")
    pub class: String,

    /// Bin identifier the item was dropped into
    pub bin: String,

    /// Formatted weight with unit suffix (e.g. "1.23 kg")
    pub weight: String,

    pub recyclable: bool,

    /// Base64-encoded JPEG still of the classified frame
    pub image: String,

    /// Local wall-clock moment of enrichment, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

/// Why an ingestion payload was refused
///
/// `Display` yields the machine-readable reason string returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("invalid_json")]
    InvalidJson(String),

    #[error("not_an_object")]
    NotAnObject,

    #[error("missing_field:{0}")]
    MissingField(&'static str),

    #[error("wrong_type:{field}:expected_{expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("empty_field:{0}")]
    EmptyField(&'static str),
}

const STRING_FIELDS: [&str; 6] = ["type", "class", "bin", "weight", "image", "timestamp"];

impl Item {
    /// Parse and validate a raw request body
    pub fn from_json_slice(body: &[u8]) -> Result<Self, RejectReason> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RejectReason::InvalidJson(e.to_string()))?;
        Self::from_json_value(value)
    }

    /// Validate an already-decoded JSON value and convert it to an `Item`
    ///
    /// Checks every required field for presence and type before conversion so
    /// the caller gets a precise reason instead of a generic serde message.
    pub fn from_json_value(value: Value) -> Result<Self, RejectReason> {
        let object = match &value {
            Value::Object(map) => map,
            _ => return Err(RejectReason::NotAnObject),
        };

        for field in STRING_FIELDS {
            require(object, field, Value::is_string, "string")?;
        }
        require(object, "recyclable", Value::is_boolean, "bool")?;

        let item: Item = serde_json::from_value(value)
            .map_err(|e| RejectReason::InvalidJson(e.to_string()))?;
        item.validate()?;
        Ok(item)
    }

    /// Check the fields a dashboard cannot render without
    pub fn validate(&self) -> Result<(), RejectReason> {
        let checks: [(&'static str, &str); 5] = [
            ("type", &self.item_type),
            ("class", &self.class),
            ("bin", &self.bin),
            ("weight", &self.weight),
            ("timestamp", &self.timestamp),
        ];
        for (field, value) in checks {
            if value.trim().is_empty() {
                return Err(RejectReason::EmptyField(field));
            }
        }
        Ok(())
    }

    /// Short human label, `type (class)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.item_type, self.class)
    }
}

fn require(
    object: &Map<String, Value>,
    field: &'static str,
    check: fn(&Value) -> bool,
    expected: &'static str,
) -> Result<(), RejectReason> {
    match object.get(field) {
        None => Err(RejectReason::MissingField(field)),
        Some(v) if !check(v) => Err(RejectReason::WrongType { field, expected }),
        Some(_) => Ok(()),
    }
}
