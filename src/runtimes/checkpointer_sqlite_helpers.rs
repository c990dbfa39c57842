//! JSON (de)serialization helpers shared by the SQL-backed checkpointers.
//!
//! Every JSON column round-trip in `checkpointer_sqlite.rs` (and the
//! Postgres backend) goes through here so errors carry a consistent
//! `{field}` name rather than whatever serde_json happened to produce.

use super::checkpointer::CheckpointerError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Serializes `value` to a JSON string, tagging failures with `field`.
pub fn serialize_json<T: Serialize>(value: &T, field: &str) -> Result<String, CheckpointerError> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Backend {
        message: format!("failed to serialize {field}: {e}"),
    })
}

/// Parses a JSON string into `T`, tagging failures with `field`.
pub fn deserialize_json<T: DeserializeOwned>(
    raw: &str,
    field: &str,
) -> Result<T, CheckpointerError> {
    serde_json::from_str(raw).map_err(|e| CheckpointerError::Backend {
        message: format!("failed to deserialize {field}: {e}"),
    })
}

/// Converts an already-parsed [`Value`] into `T`, tagging failures with `field`.
pub fn deserialize_json_value<T: DeserializeOwned>(
    value: Value,
    field: &str,
) -> Result<T, CheckpointerError> {
    serde_json::from_value(value).map_err(|e| CheckpointerError::Backend {
        message: format!("failed to deserialize {field}: {e}"),
    })
}

/// Unwraps a nullable SQL column, erroring with `field` named if absent.
pub fn require_json_field(
    column: Option<String>,
    field: &str,
) -> Result<String, CheckpointerError> {
    column.ok_or_else(|| CheckpointerError::Backend {
        message: format!("missing required column {field}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_then_deserialize_roundtrips() {
        let json = serialize_json(&42u32, "n").unwrap();
        let back: u32 = deserialize_json(&json, "n").unwrap();
        assert_eq!(back, 42);
    }

    #[test]
    fn require_json_field_errors_on_none() {
        assert!(require_json_field(None, "missing").is_err());
    }
}
