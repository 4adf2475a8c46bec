//! Model, Key, and Data handles.
//!
//! A `Model` is a cheap handle on compiled schema metadata. `Key`
//! identifies one row (validated component values plus their encoded
//! physical form); `Data` carries a key plus non-key values for the
//! create-or-put and create-if-missing paths.

use crate::{
    PARTITION_KEY_ATTR, SORT_KEY_ATTR,
    db::key::{encode_partition_key, encode_sort_key},
    error::Error,
    schema::{FieldRole, ModelSpec},
    store::Attrs,
    value::{KeyValue, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc};

///
/// Model
///

#[derive(Clone, Debug)]
pub struct Model {
    spec: Arc<ModelSpec>,
}

impl Model {
    pub(crate) const fn new(spec: Arc<ModelSpec>) -> Self {
        Self { spec }
    }

    #[must_use]
    pub(crate) fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    #[must_use]
    pub fn table(&self) -> &str {
        self.spec.table()
    }

    /// Handle identifying one row. `vals` must supply exactly the
    /// partition and sort key components.
    pub fn key(&self, vals: impl Into<BTreeMap<String, Value>>) -> Result<Key, Error> {
        let vals = vals.into();
        for name in vals.keys() {
            let def = self.spec.field_def(name).ok_or_else(|| Error::InvalidParameter {
                name: name.clone(),
                reason: "unknown field in key values".to_string(),
            })?;
            if def.role == FieldRole::Attribute {
                return Err(Error::InvalidParameter {
                    name: name.clone(),
                    reason: "non-key field passed to key()".to_string(),
                });
            }
        }

        let ident = ItemIdent::for_key(&self.spec, &vals)?;
        Ok(Key {
            spec: Arc::clone(&self.spec),
            vals,
            ident,
        })
    }

    /// Handle carrying key plus non-key values.
    pub fn data(&self, vals: impl Into<BTreeMap<String, Value>>) -> Result<Data, Error> {
        let vals = vals.into();
        for name in vals.keys() {
            if self.spec.field_def(name).is_none() {
                return Err(Error::InvalidParameter {
                    name: name.clone(),
                    reason: "unknown field in data values".to_string(),
                });
            }
        }

        let ident = ItemIdent::for_key(&self.spec, &vals)?;
        Ok(Data {
            spec: Arc::clone(&self.spec),
            vals,
            ident,
        })
    }
}

///
/// ItemIdent
///
/// Identity of one row: table plus encoded key attributes. Used as the
/// batcher's tracking key and in error payloads.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct ItemIdent {
    pub table: String,
    pub id: KeyValue,
    pub sk: Option<KeyValue>,
}

impl ItemIdent {
    pub(crate) fn for_key(
        spec: &Arc<ModelSpec>,
        vals: &BTreeMap<String, Value>,
    ) -> Result<Self, Error> {
        let id = KeyValue::from(encode_partition_key(spec, vals)?);
        let sk = encode_sort_key(spec, vals)?.map(KeyValue::from);
        Ok(Self {
            table: spec.table().to_string(),
            id,
            sk,
        })
    }

    /// Rebuild an identity from a raw store payload's key attributes.
    pub(crate) fn from_attrs(table: &str, attrs: &Attrs) -> Result<Self, Error> {
        let id = attrs
            .get(PARTITION_KEY_ATTR)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter {
                name: PARTITION_KEY_ATTR.to_string(),
                reason: "store payload is missing the partition key".to_string(),
            })?;
        Ok(Self {
            table: table.to_string(),
            id: KeyValue::from(id),
            sk: attrs.get(SORT_KEY_ATTR).cloned().map(KeyValue::from),
        })
    }

    /// Physical key attributes (`_id`, and `_sk` when present).
    #[must_use]
    pub(crate) fn key_attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert(PARTITION_KEY_ATTR.to_string(), self.id.inner().clone());
        if let Some(sk) = &self.sk {
            attrs.insert(SORT_KEY_ATTR.to_string(), sk.inner().clone());
        }
        attrs
    }
}

impl fmt::Display for ItemIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sk {
            Some(sk) => write!(
                f,
                "{} [{:?}, {:?}]",
                self.table,
                self.id.inner(),
                sk.inner()
            ),
            None => write!(f, "{} [{:?}]", self.table, self.id.inner()),
        }
    }
}

///
/// Key
///

#[derive(Clone, Debug)]
pub struct Key {
    pub(crate) spec: Arc<ModelSpec>,
    pub(crate) vals: BTreeMap<String, Value>,
    pub(crate) ident: ItemIdent,
}

impl Key {
    #[must_use]
    pub fn table(&self) -> &str {
        self.spec.table()
    }

    #[must_use]
    pub(crate) fn key_attrs(&self) -> Attrs {
        self.ident.key_attrs()
    }

    /// The key-component values only, dropping any extras.
    #[must_use]
    pub(crate) fn key_vals(&self) -> BTreeMap<String, Value> {
        self.spec
            .key_order()
            .iter()
            .chain(self.spec.sort_key_order())
            .filter_map(|name| self.vals.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

///
/// Data
///

#[derive(Clone, Debug)]
pub struct Data {
    pub(crate) spec: Arc<ModelSpec>,
    pub(crate) vals: BTreeMap<String, Value>,
    pub(crate) ident: ItemIdent,
}

impl Data {
    #[must_use]
    pub fn table(&self) -> &str {
        self.spec.table()
    }

    /// Downgrade to the identifying key.
    #[must_use]
    pub fn to_key(&self) -> Key {
        Key {
            spec: Arc::clone(&self.spec),
            vals: self
                .spec
                .key_order()
                .iter()
                .chain(self.spec.sort_key_order())
                .filter_map(|name| self.vals.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
            ident: self.ident.clone(),
        }
    }
}

///
/// KeyOrData
///
/// Argument position accepted by multi-get and delete.
///

#[derive(Clone, Debug)]
pub enum KeyOrData {
    Key(Key),
    Data(Data),
}

impl KeyOrData {
    #[must_use]
    pub(crate) fn spec(&self) -> &Arc<ModelSpec> {
        match self {
            Self::Key(key) => &key.spec,
            Self::Data(data) => &data.spec,
        }
    }

    #[must_use]
    pub(crate) fn ident(&self) -> &ItemIdent {
        match self {
            Self::Key(key) => &key.ident,
            Self::Data(data) => &data.ident,
        }
    }

    #[must_use]
    pub(crate) fn key_attrs(&self) -> Attrs {
        self.ident().key_attrs()
    }
}

impl From<Key> for KeyOrData {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<Data> for KeyOrData {
    fn from(data: Data) -> Self {
        Self::Data(data)
    }
}
