use crate::schema::{FieldSchema, IndexSchema};
use std::collections::BTreeMap;

///
/// ModelSchema
///
/// Declarative description of one model: primary key components,
/// non-key fields, secondary indexes, and table-level flags. Compiled
/// once into a `ModelSpec` (validating every §invariant) before any
/// runtime use.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ModelSchema {
    pub(crate) table: String,
    pub(crate) key: BTreeMap<String, FieldSchema>,
    pub(crate) sort_key: BTreeMap<String, FieldSchema>,
    pub(crate) fields: BTreeMap<String, FieldSchema>,
    pub(crate) indexes: BTreeMap<String, IndexSchema>,
    pub(crate) expire_epoch_field: Option<String>,
    pub(crate) index_include_keys: bool,
    pub(crate) string_sort_key: bool,
}

impl ModelSchema {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: BTreeMap::new(),
            sort_key: BTreeMap::new(),
            fields: BTreeMap::new(),
            indexes: BTreeMap::new(),
            expire_epoch_field: None,
            index_include_keys: false,
            string_sort_key: false,
        }
    }

    /// Add one partition-key component.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.key.insert(name.into(), schema);
        self
    }

    /// Add one sort-key component.
    #[must_use]
    pub fn sort_key(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.sort_key.insert(name.into(), schema);
        self
    }

    /// Add one non-key field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Add one secondary index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, schema: IndexSchema) -> Self {
        self.indexes.insert(name.into(), schema);
        self
    }

    /// Name the integer field holding the item's TTL epoch.
    #[must_use]
    pub fn expire_epoch_field(mut self, name: impl Into<String>) -> Self {
        self.expire_epoch_field = Some(name.into());
        self
    }

    /// Materialize per-component compound projections for index key
    /// fields, enabling lazy filters on individual components.
    #[must_use]
    pub const fn index_include_keys(mut self) -> Self {
        self.index_include_keys = true;
        self
    }

    /// Keep a single numeric sort component string-encoded instead of
    /// using the native numeric store key.
    #[must_use]
    pub const fn string_sort_key(mut self) -> Self {
        self.string_sort_key = true;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}
