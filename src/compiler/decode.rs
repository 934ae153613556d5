//! Flexible decoding of request fields.
//!
//! Report front ends send structured fields either as native JSON values or
//! as JSON-encoded strings (a leftover of form-encoded transports). This
//! module is the single place that accepts both shapes.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode error for a flexible field.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Decode a field that may be a native value or a JSON-encoded string.
///
/// The contract:
///
/// - `null` and the empty string decode to `Ok(None)` (field absent);
/// - a string is parsed as JSON and then deserialized into `T`;
/// - any other value is deserialized into `T` directly;
/// - anything that fails to deserialize is an explicit [`DecodeError`],
///   never a guessed fallback.
pub fn flexible<T: DeserializeOwned>(value: &Value) -> Result<Option<T>, DecodeError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s)?;
            Ok(Some(serde_json::from_value(parsed)?))
        }
        other => Ok(Some(serde_json::from_value(other.clone())?)),
    }
}
