use crate::value::Value;
use derive_more::{Deref, From};
use std::cmp::Ordering;

///
/// KeyValue
///
/// Total-order wrapper for values in key positions (`_id`, `_sk`, and
/// index key attributes). Strings order lexicographically by bytes,
/// numbers numerically; mixed numeric kinds compare through `f64`.
/// Kinds never mix within one attribute in practice, but the order is
/// still total so store-side maps can hold arbitrary rows.
///

#[derive(Clone, Debug, Deref, From)]
pub struct KeyValue(pub Value);

impl KeyValue {
    #[must_use]
    pub const fn inner(&self) -> &Value {
        &self.0
    }

    fn rank(&self) -> u8 {
        match self.0 {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::List(_) => 3,
            Value::Map(_) => 4,
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Str(a), Value::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                // is_numeric guarantees as_f64 on both sides
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (Value::List(a), Value::List(b)) => {
                let a: Vec<Self> = a.iter().cloned().map(Self).collect();
                let b: Vec<Self> = b.iter().cloned().map(Self).collect();
                a.cmp(&b)
            }
            (Value::Map(a), Value::Map(b)) => {
                let a: Vec<(&String, Self)> =
                    a.iter().map(|(k, v)| (k, Self(v.clone()))).collect();
                let b: Vec<(&String, Self)> =
                    b.iter().map(|(k, v)| (k, Self(v.clone()))).collect();
                a.cmp(&b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
