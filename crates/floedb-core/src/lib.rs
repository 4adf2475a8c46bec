//! Core runtime for FloeDB: declarative model schemas, per-field
//! optimistic-lock tracking, transactional write batching, and the
//! query/scan iterator surface, all over a narrow conditional-write
//! store contract.

pub mod clock;
pub mod db;
pub mod error;
pub mod schema;
pub mod store;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Separator byte between encoded compound-key components.
///
/// String components are stored raw, so they must never contain this
/// byte; the codec rejects them.
pub const KEY_COMPONENT_SEPARATOR: char = '\0';

/// Physical attribute name of the encoded partition key.
pub const PARTITION_KEY_ATTR: &str = "_id";

/// Physical attribute name of the encoded sort key.
pub const SORT_KEY_ATTR: &str = "_sk";

/// Build a `BTreeMap<String, Value>` from `name => value` pairs.
///
/// ```ignore
/// let key = model.key(vals! { "id" => "a", "seq" => 7 })?;
/// ```
#[macro_export]
macro_rules! vals {
    () => {
        ::std::collections::BTreeMap::<::std::string::String, $crate::value::Value>::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map =
            ::std::collections::BTreeMap::<::std::string::String, $crate::value::Value>::new();
        $(map.insert($name.to_string(), $crate::value::Value::from($value));)+
        map
    }};
}

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No stores, executors, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{Db, GetOptions, Transaction, TransactionOptions},
        error::Error,
        schema::{FieldSchema, IndexSchema, ModelSchema},
        value::Value,
    };
}
