//! Compound-key codec.
//!
//! Components are concatenated in sorted component-name order with a
//! NUL separator. String components are stored raw (NUL is rejected);
//! everything else uses canonical JSON, whose escaping never emits a
//! raw NUL byte. A key made of exactly one numeric component is stored
//! as the raw number so the store sorts it natively.

use crate::{
    KEY_COMPONENT_SEPARATOR,
    error::Error,
    schema::{FieldKind, ModelSpec},
    value::{Value, from_canonical_json, to_canonical_json},
};
use std::collections::BTreeMap;

/// Encode the partition key from component values.
pub(crate) fn encode_partition_key(
    spec: &ModelSpec,
    vals: &BTreeMap<String, Value>,
) -> Result<Value, Error> {
    encode_components(spec, spec.key_order(), spec.partition_key_numeric(), vals)?.ok_or_else(
        || Error::InvalidParameter {
            name: "KEY".to_string(),
            reason: "missing partition key component".to_string(),
        },
    )
}

/// Encode the sort key from component values; `None` when the model
/// has no sort key.
pub(crate) fn encode_sort_key(
    spec: &ModelSpec,
    vals: &BTreeMap<String, Value>,
) -> Result<Option<Value>, Error> {
    if !spec.has_sort_key() {
        return Ok(None);
    }
    encode_components(spec, spec.sort_key_order(), spec.sort_key_numeric(), vals)?
        .map_or_else(
            || {
                Err(Error::InvalidParameter {
                    name: "SORT_KEY".to_string(),
                    reason: "missing sort key component".to_string(),
                })
            },
            |key| Ok(Some(key)),
        )
}

/// Encode an arbitrary component set (index keys, compound
/// projections). Returns `None` when any component value is absent,
/// which is how sparse indexes fall out of materialization.
pub(crate) fn encode_components(
    spec: &ModelSpec,
    order: &[String],
    numeric: bool,
    vals: &BTreeMap<String, Value>,
) -> Result<Option<Value>, Error> {
    if numeric {
        let name = &order[0];
        let Some(value) = vals.get(name) else {
            return Ok(None);
        };
        validate_component(spec, name, value)?;
        return Ok(Some(value.clone()));
    }

    let mut pieces = Vec::with_capacity(order.len());
    for name in order {
        let Some(value) = vals.get(name) else {
            return Ok(None);
        };
        validate_component(spec, name, value)?;
        pieces.push(encode_piece(name, value)?);
    }

    Ok(Some(Value::Str(
        pieces.join(&KEY_COMPONENT_SEPARATOR.to_string()),
    )))
}

/// Does this component set encode to the native numeric form?
pub(crate) fn components_numeric(spec: &ModelSpec, order: &[String]) -> bool {
    match order {
        [only] => spec
            .field_def(only)
            .is_some_and(|def| def.schema.kind().is_numeric()),
        _ => false,
    }
}

/// Decode an encoded partition key back into component values.
pub(crate) fn decode_partition_key(
    spec: &ModelSpec,
    raw: &Value,
) -> Result<BTreeMap<String, Value>, Error> {
    decode_components(spec, spec.key_order(), spec.partition_key_numeric(), raw)
}

/// Decode an encoded sort key back into component values.
pub(crate) fn decode_sort_key(
    spec: &ModelSpec,
    raw: &Value,
) -> Result<BTreeMap<String, Value>, Error> {
    decode_components(spec, spec.sort_key_order(), spec.sort_key_numeric(), raw)
}

fn decode_components(
    spec: &ModelSpec,
    order: &[String],
    numeric: bool,
    raw: &Value,
) -> Result<BTreeMap<String, Value>, Error> {
    if numeric {
        let name = &order[0];
        validate_component(spec, name, raw)?;
        return Ok(BTreeMap::from([(name.clone(), raw.clone())]));
    }

    let Value::Str(encoded) = raw else {
        return Err(Error::InvalidParameter {
            name: "key".to_string(),
            reason: format!("encoded key must be a string, got {:?}", raw.kind()),
        });
    };

    let pieces: Vec<&str> = encoded.split(KEY_COMPONENT_SEPARATOR).collect();
    if pieces.len() != order.len() {
        return Err(Error::InvalidParameter {
            name: "key".to_string(),
            reason: format!(
                "encoded key has {} components, expected {}",
                pieces.len(),
                order.len()
            ),
        });
    }

    let mut vals = BTreeMap::new();
    for (name, piece) in order.iter().zip(pieces) {
        let value = decode_piece(spec, name, piece)?;
        validate_component(spec, name, &value)?;
        vals.insert(name.clone(), value);
    }

    Ok(vals)
}

fn validate_component(spec: &ModelSpec, name: &str, value: &Value) -> Result<(), Error> {
    let def = spec.field_def(name).ok_or_else(|| Error::InvalidParameter {
        name: name.to_string(),
        reason: "unknown key component".to_string(),
    })?;
    def.schema.validate(name, value)
}

pub(crate) fn encode_piece(name: &str, value: &Value) -> Result<String, Error> {
    match value {
        Value::Str(s) => {
            if s.contains(KEY_COMPONENT_SEPARATOR) {
                return Err(Error::InvalidField {
                    field: name.to_string(),
                    reason: "string key components may not contain NUL".to_string(),
                });
            }
            Ok(s.clone())
        }
        other => to_canonical_json(other).map_err(|err| Error::InvalidField {
            field: name.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn decode_piece(spec: &ModelSpec, name: &str, piece: &str) -> Result<Value, Error> {
    let def = spec.field_def(name).ok_or_else(|| Error::InvalidParameter {
        name: name.to_string(),
        reason: "unknown key component".to_string(),
    })?;

    if def.schema.kind() == FieldKind::Str {
        return Ok(Value::Str(piece.to_string()));
    }

    from_canonical_json(piece).map_err(|err| Error::InvalidField {
        field: name.to_string(),
        reason: err.to_string(),
    })
}

///
/// TESTS
///
