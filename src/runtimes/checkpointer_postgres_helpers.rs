//! JSON helpers for the Postgres checkpointer.
//!
//! Unlike the SQLite backend (which stores JSON as `TEXT` and round-trips
//! through strings), Postgres binds JSONB columns as [`serde_json::Value`]
//! directly, so these helpers work in `Value`, not `String`.

use super::checkpointer::CheckpointerError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Serializes `value` into a [`Value`] suitable for a JSONB bind parameter.
pub fn serialize_json<T: Serialize>(value: &T, field: &str) -> Result<Value, CheckpointerError> {
    serde_json::to_value(value).map_err(|e| CheckpointerError::Backend {
        message: format!("failed to serialize {field}: {e}"),
    })
}

/// Converts a [`Value`] read back from a JSONB column into `T`.
pub fn deserialize_json_value<T: DeserializeOwned>(
    value: Value,
    field: &str,
) -> Result<T, CheckpointerError> {
    serde_json::from_value(value).map_err(|e| CheckpointerError::Backend {
        message: format!("failed to deserialize {field}: {e}"),
    })
}

/// Unwraps a nullable JSONB column, erroring with `field` named if absent.
pub fn require_json_field(
    column: Option<Value>,
    field: &str,
) -> Result<Value, CheckpointerError> {
    column.ok_or_else(|| CheckpointerError::Backend {
        message: format!("missing required column {field}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_then_deserialize_value_roundtrips() {
        let value = serialize_json(&42u32, "n").unwrap();
        let back: u32 = deserialize_json_value(value, "n").unwrap();
        assert_eq!(back, 42);
    }

    #[test]
    fn require_json_field_errors_on_none() {
        assert!(require_json_field(None, "missing").is_err());
    }
}
