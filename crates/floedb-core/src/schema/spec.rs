use crate::{
    error::Error,
    schema::{FieldSchema, IndexSchema, ModelSchema},
};
use std::collections::{BTreeMap, BTreeSet};

/// Accessor names the runtime itself exposes on items; fields may not
/// shadow them.
const RESERVED_FIELD_NAMES: &[&str] = &[
    "get",
    "set",
    "increment_by",
    "validate",
    "key",
    "data",
    "model",
    "snapshot",
];

///
/// FieldRole
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldRole {
    PartitionKey,
    SortKey,
    Attribute,
}

impl FieldRole {
    #[must_use]
    pub const fn is_key(self) -> bool {
        matches!(self, Self::PartitionKey | Self::SortKey)
    }
}

///
/// FieldDef
///
/// One compiled field: declared schema plus its role on the model.
///

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub role: FieldRole,
    pub schema: FieldSchema,
}

///
/// IndexDef
///
/// One compiled secondary index. Component lists are stored in the
/// sorted order the key codec uses, and the physical attribute names
/// are fixed at compile time.
///

#[derive(Clone, Debug)]
pub struct IndexDef {
    pub name: String,
    pub partition_attr: String,
    /// False when the index key is a single non-key field stored under
    /// its own name; true when a compound attribute is materialized.
    pub partition_materialized: bool,
    pub sort_attr: Option<String>,
    pub sort_materialized: bool,
    pub key_fields: Vec<String>,
    pub sort_fields: Vec<String>,
    pub sparse: bool,
    pub include_only: Option<BTreeSet<String>>,
}

///
/// ModelSpec
///
/// Validated, immutable model metadata. Compiled once per model and
/// cached in the `Db` registry; everything downstream (items, key
/// codec, batcher, iterators) reads from here.
///

#[derive(Debug)]
pub struct ModelSpec {
    table: String,
    key_order: Vec<String>,
    sort_key_order: Vec<String>,
    fields: BTreeMap<String, FieldDef>,
    indexes: BTreeMap<String, IndexDef>,
    expire_epoch_field: Option<String>,
    index_include_keys: bool,
    string_sort_key: bool,
    schema: ModelSchema,
}

impl ModelSpec {
    /// Validate a declared schema and materialize the compiled spec.
    pub fn compile(schema: ModelSchema) -> Result<Self, Error> {
        if schema.table.is_empty() {
            return Err(Error::InvalidParameter {
                name: "table".to_string(),
                reason: "table name must be non-empty".to_string(),
            });
        }

        if schema.key.is_empty() {
            return Err(Error::InvalidParameter {
                name: "KEY".to_string(),
                reason: "partition key must have at least one component".to_string(),
            });
        }

        let mut fields: BTreeMap<String, FieldDef> = BTreeMap::new();

        let mut insert = |name: &str, role: FieldRole, schema: &FieldSchema| -> Result<(), Error> {
            validate_field_name(name)?;

            let mut schema = schema.clone();
            if role.is_key() {
                if schema.is_optional() {
                    return Err(Error::InvalidParameter {
                        name: name.to_string(),
                        reason: "key components are required".to_string(),
                    });
                }
                if role == FieldRole::PartitionKey && schema.default().is_some() {
                    return Err(Error::InvalidParameter {
                        name: name.to_string(),
                        reason: "partition key components may not have a default".to_string(),
                    });
                }
                schema.force_immutable();
            }

            let def = FieldDef {
                name: name.to_string(),
                role,
                schema,
            };
            if fields.insert(name.to_string(), def).is_some() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    reason: "field declared more than once across KEY/SORT_KEY/FIELDS".to_string(),
                });
            }
            Ok(())
        };

        for (name, field_schema) in &schema.key {
            insert(name, FieldRole::PartitionKey, field_schema)?;
        }
        for (name, field_schema) in &schema.sort_key {
            insert(name, FieldRole::SortKey, field_schema)?;
        }
        for (name, field_schema) in &schema.fields {
            insert(name, FieldRole::Attribute, field_schema)?;
        }

        if let Some(ttl_field) = &schema.expire_epoch_field {
            let def = fields.get(ttl_field).ok_or_else(|| Error::InvalidParameter {
                name: ttl_field.clone(),
                reason: "EXPIRE_EPOCH_FIELD names an undeclared field".to_string(),
            })?;
            if !def.schema.kind().is_numeric() {
                return Err(Error::InvalidParameter {
                    name: ttl_field.clone(),
                    reason: "EXPIRE_EPOCH_FIELD must be numeric".to_string(),
                });
            }
        }

        let mut indexes = BTreeMap::new();
        for (index_name, index_schema) in &schema.indexes {
            let def = compile_index(index_name, index_schema, &fields)?;
            indexes.insert(index_name.clone(), def);
        }

        // BTreeMap iteration is already the sorted component-name order
        // the key codec relies on.
        let key_order: Vec<String> = schema.key.keys().cloned().collect();
        let sort_key_order: Vec<String> = schema.sort_key.keys().cloned().collect();

        Ok(Self {
            table: schema.table.clone(),
            key_order,
            sort_key_order,
            fields,
            indexes,
            expire_epoch_field: schema.expire_epoch_field.clone(),
            index_include_keys: schema.index_include_keys,
            string_sort_key: schema.string_sort_key,
            schema,
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn key_order(&self) -> &[String] {
        &self.key_order
    }

    #[must_use]
    pub fn sort_key_order(&self) -> &[String] {
        &self.sort_key_order
    }

    #[must_use]
    pub fn has_sort_key(&self) -> bool {
        !self.sort_key_order.is_empty()
    }

    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// All compiled fields in name order.
    pub fn field_defs(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Non-key fields in name order.
    pub fn attribute_defs(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .values()
            .filter(|def| def.role == FieldRole::Attribute)
    }

    #[must_use]
    pub fn index_def(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }

    pub fn index_defs(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.values()
    }

    #[must_use]
    pub fn expire_epoch_field(&self) -> Option<&str> {
        self.expire_epoch_field.as_deref()
    }

    #[must_use]
    pub const fn index_include_keys(&self) -> bool {
        self.index_include_keys
    }

    #[must_use]
    pub const fn string_sort_key(&self) -> bool {
        self.string_sort_key
    }

    /// Does the encoded partition key use the native numeric form?
    #[must_use]
    pub fn partition_key_numeric(&self) -> bool {
        self.single_numeric_component(&self.key_order)
    }

    /// Does the encoded sort key use the native numeric form? The
    /// `string_sort_key` flag opts a model out.
    #[must_use]
    pub fn sort_key_numeric(&self) -> bool {
        !self.string_sort_key && self.single_numeric_component(&self.sort_key_order)
    }

    fn single_numeric_component(&self, order: &[String]) -> bool {
        match order {
            [only] => self
                .fields
                .get(only)
                .is_some_and(|def| def.schema.kind().is_numeric()),
            _ => false,
        }
    }

    /// The declared schema this spec was compiled from; used to detect
    /// conflicting re-registrations.
    #[must_use]
    pub(crate) const fn declared(&self) -> &ModelSchema {
        &self.schema
    }
}

fn validate_field_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: "field names must be non-empty".to_string(),
        });
    }
    if name.starts_with('_') {
        return Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: "field names may not start with '_'".to_string(),
        });
    }
    if RESERVED_FIELD_NAMES.contains(&name) {
        return Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: "field name shadows a built-in accessor".to_string(),
        });
    }
    Ok(())
}

fn compile_index(
    name: &str,
    schema: &IndexSchema,
    fields: &BTreeMap<String, FieldDef>,
) -> Result<IndexDef, Error> {
    if name.is_empty() || name.starts_with('_') {
        return Err(Error::InvalidIndex {
            index: name.to_string(),
            reason: "index names must be non-empty and may not start with '_'".to_string(),
        });
    }
    if schema.key_fields().is_empty() {
        return Err(Error::InvalidIndex {
            index: name.to_string(),
            reason: "index must have at least one key field".to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for field in schema.key_fields().iter().chain(schema.sort_fields()) {
        let def = fields.get(field).ok_or_else(|| Error::InvalidIndex {
            index: name.to_string(),
            reason: format!("index key field '{field}' is not declared on the model"),
        })?;
        if !schema.is_sparse() && def.schema.is_optional() {
            return Err(Error::InvalidIndex {
                index: name.to_string(),
                reason: format!("non-sparse index may not use optional key field '{field}'"),
            });
        }
        if !seen.insert(field.clone()) {
            return Err(Error::InvalidIndex {
                index: name.to_string(),
                reason: format!("field '{field}' appears twice in the index key"),
            });
        }
    }

    let include_only = match schema.included_fields() {
        None => None,
        Some(included) => {
            let mut set = BTreeSet::new();
            for field in included {
                if !fields.contains_key(field) {
                    return Err(Error::InvalidIndex {
                        index: name.to_string(),
                        reason: format!("INCLUDE_ONLY field '{field}' is not declared"),
                    });
                }
                if seen.contains(field) {
                    return Err(Error::InvalidIndex {
                        index: name.to_string(),
                        reason: format!("INCLUDE_ONLY field '{field}' duplicates an index key"),
                    });
                }
                set.insert(field.clone());
            }
            Some(set)
        }
    };

    let mut key_fields: Vec<String> = schema.key_fields().to_vec();
    key_fields.sort();
    let mut sort_fields: Vec<String> = schema.sort_fields().to_vec();
    sort_fields.sort();

    // A single non-key field is already stored under its own name, so
    // the index can target it directly; anything else needs a
    // materialized compound attribute.
    let direct = |components: &[String]| -> Option<String> {
        match components {
            [only] if fields.get(only).map(|def| def.role) == Some(FieldRole::Attribute) => {
                Some(only.clone())
            }
            _ => None,
        }
    };

    let (partition_attr, partition_materialized) = direct(&key_fields)
        .map_or_else(|| (format!("_{name}_id"), true), |attr| (attr, false));

    let (sort_attr, sort_materialized) = if sort_fields.is_empty() {
        (None, false)
    } else {
        direct(&sort_fields).map_or_else(
            || (Some(format!("_{name}_sk")), true),
            |attr| (Some(attr), false),
        )
    };

    Ok(IndexDef {
        name: name.to_string(),
        partition_attr,
        partition_materialized,
        sort_attr,
        sort_materialized,
        key_fields,
        sort_fields,
        sparse: schema.is_sparse(),
        include_only,
    })
}
