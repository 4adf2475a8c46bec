//! Canonical JSON rendering for compound-key pieces.
//!
//! `Value::Map` is a `BTreeMap`, so serialization already emits keys in
//! sorted order; compact rendering makes the form whitespace-free. The
//! pair (sorted keys, no whitespace) is what makes encoded key pieces
//! deterministic and injective.

use crate::value::Value;
use thiserror::Error as ThisError;

///
/// CanonicalJsonError
///

#[derive(Debug, ThisError)]
pub enum CanonicalJsonError {
    #[error("value is not representable as canonical JSON: {0}")]
    Unrepresentable(String),

    #[error("invalid canonical JSON piece: {0}")]
    Invalid(String),
}

/// Render a value in canonical JSON form.
pub fn to_canonical_json(value: &Value) -> Result<String, CanonicalJsonError> {
    serde_json::to_string(value).map_err(|err| CanonicalJsonError::Unrepresentable(err.to_string()))
}

/// Parse one canonical JSON piece back into a value.
pub fn from_canonical_json(piece: &str) -> Result<Value, CanonicalJsonError> {
    serde_json::from_str(piece).map_err(|err| CanonicalJsonError::Invalid(err.to_string()))
}
