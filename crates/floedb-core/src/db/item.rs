//! Item runtime.
//!
//! An `Item` binds field states to a compiled model: it materializes
//! from user values or a raw store payload, serves tracked reads and
//! writes, and emits the put/update/delete/condition-check parameter
//! structures the batcher submits to the store.

use crate::{
    PARTITION_KEY_ATTR,
    db::{
        expr::ExprBuilder,
        field::{FieldState, ItemSource},
        key::{components_numeric, decode_partition_key, decode_sort_key, encode_components},
        model::ItemIdent,
    },
    error::Error,
    schema::{FieldRole, IndexDef, ModelSpec},
    store::{
        Attrs, ConditionCheckInput, DeleteInput, PutInput, TransactWriteItem, UpdateInput,
    },
    value::Value,
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::Arc};

/// Window within which an expired TTL still counts as "this item is
/// gone": five years, mirroring the store's own cap on how stale a TTL
/// value may be and still be honored.
const TTL_EXPIRY_WINDOW_SECONDS: i64 = 5 * 365 * 24 * 60 * 60;

/// Attribute prefix for per-component compound projections.
const COMPONENT_PROJECTION_PREFIX: &str = "_c_";

///
/// Item
///

#[derive(Debug)]
pub(crate) struct Item {
    spec: Arc<ModelSpec>,
    source: ItemSource,
    fields: BTreeMap<String, FieldState>,
    ident: ItemIdent,
    /// True when the row was materialized from a store payload.
    from_store: bool,
    /// Marked for deletion by the transaction.
    deleted: bool,
}

impl Item {
    /// Materialize from user-supplied values (create/update/delete
    /// paths). Key components must all be present.
    pub(crate) fn from_vals(
        spec: &Arc<ModelSpec>,
        source: ItemSource,
        vals: &BTreeMap<String, Value>,
    ) -> Result<Self, Error> {
        for name in vals.keys() {
            if spec.field_def(name).is_none() {
                return Err(Error::InvalidParameter {
                    name: name.clone(),
                    reason: "unknown field".to_string(),
                });
            }
        }

        let mut fields = BTreeMap::new();
        for def in spec.field_defs() {
            let caller_value = vals.get(&def.name).cloned();
            if let Some(value) = &caller_value {
                def.schema.validate(&def.name, value)?;
            }
            fields.insert(
                def.name.clone(),
                FieldState::new(def, source, caller_value, false),
            );
        }

        let ident = ItemIdent::for_key(spec, vals)?;
        Ok(Self {
            spec: Arc::clone(spec),
            source,
            fields,
            ident,
            from_store: false,
            deleted: source == ItemSource::Delete,
        })
    }

    /// Materialize from a raw store payload (get/scan paths). The
    /// encoded keys are decoded back into component values and every
    /// present field is validated.
    pub(crate) fn from_store_attrs(
        spec: &Arc<ModelSpec>,
        source: ItemSource,
        attrs: &Attrs,
    ) -> Result<Self, Error> {
        let ident = ItemIdent::from_attrs(spec.table(), attrs)?;

        let mut vals = decode_partition_key(spec, ident.id.inner())?;
        if let Some(sk) = &ident.sk {
            vals.extend(decode_sort_key(spec, sk.inner())?);
        } else if spec.has_sort_key() {
            return Err(Error::InvalidParameter {
                name: "_sk".to_string(),
                reason: "store payload is missing the sort key".to_string(),
            });
        }

        for def in spec.attribute_defs() {
            if let Some(value) = attrs.get(&def.name) {
                def.schema.validate(&def.name, value)?;
                vals.insert(def.name.clone(), value.clone());
            }
        }

        let mut fields = BTreeMap::new();
        for def in spec.field_defs() {
            let caller_value = vals.get(&def.name).cloned();
            fields.insert(
                def.name.clone(),
                FieldState::new(def, source, caller_value, true),
            );
        }

        Ok(Self {
            spec: Arc::clone(spec),
            source,
            fields,
            ident,
            from_store: true,
            deleted: false,
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub(crate) const fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    #[must_use]
    pub(crate) const fn source(&self) -> ItemSource {
        self.source
    }

    #[must_use]
    pub(crate) const fn ident(&self) -> &ItemIdent {
        &self.ident
    }

    /// A new item is one that was not loaded from the store and must
    /// therefore not exist at commit time.
    #[must_use]
    pub(crate) const fn is_new(&self) -> bool {
        !self.from_store && !matches!(self.source, ItemSource::Update | ItemSource::CreateOrPut)
    }

    #[must_use]
    pub(crate) const fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) const fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Dirty items produce a write entry at commit.
    #[must_use]
    pub(crate) fn is_dirty(&self) -> bool {
        self.deleted || self.is_new() || self.fields.values().any(FieldState::mutated)
    }

    // ------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------

    fn field_mut(&mut self, name: &str) -> Result<&mut FieldState, Error> {
        self.fields.get_mut(name).ok_or_else(|| Error::InvalidField {
            field: name.to_string(),
            reason: "field is not declared on this model".to_string(),
        })
    }

    pub(crate) fn get(&mut self, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.field_mut(name)?.get())
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.field_mut(name)?.set(value)
    }

    pub(crate) fn clear(&mut self, name: &str) -> Result<(), Error> {
        self.field_mut(name)?.clear()
    }

    pub(crate) fn increment_by(&mut self, name: &str, diff: Value) -> Result<(), Error> {
        self.field_mut(name)?.increment_by(diff)
    }

    /// Overwrite one field's optimistic-lock baseline and mark it read
    /// (update/create-or-put construction).
    pub(crate) fn assume_initial(&mut self, name: &str, initial: Option<Value>) -> Result<(), Error> {
        self.field_mut(name)?.assume_initial(initial);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validation / finalize
    // ------------------------------------------------------------------

    /// Pre-write validation. Update-sourced items validate only the
    /// fields they carry; deletions skip validation (the values are
    /// about to disappear); everything else must be a complete item.
    pub(crate) fn finalize(&self) -> Result<(), Error> {
        if self.deleted {
            return Ok(());
        }
        for state in self.fields.values() {
            if self.source == ItemSource::Update {
                state.validate_present()?;
            } else {
                state.validate_full()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub(crate) fn snapshot_initial(&self) -> BTreeMap<String, Value> {
        let mut snapshot = BTreeMap::new();
        if !self.from_store {
            return snapshot;
        }
        for state in self.fields.values() {
            let value = if state.is_key() {
                state.peek()
            } else {
                state.initial()
            };
            if let Some(value) = value {
                snapshot.insert(state.name().to_string(), value.clone());
            }
        }
        snapshot
    }

    pub(crate) fn snapshot_current(&self) -> BTreeMap<String, Value> {
        let mut snapshot = BTreeMap::new();
        if self.deleted {
            return snapshot;
        }
        for state in self.fields.values() {
            if let Some(value) = state.peek() {
                snapshot.insert(state.name().to_string(), value.clone());
            }
        }
        snapshot
    }

    // ------------------------------------------------------------------
    // Parameter emission
    // ------------------------------------------------------------------

    /// The full physical payload: encoded keys, defined fields, index
    /// key attributes, and compound projections.
    fn physical_item(&self) -> Result<Attrs, Error> {
        let mut attrs = self.ident.key_attrs();

        let mut current = BTreeMap::new();
        for state in self.fields.values() {
            if let Some(value) = state.peek() {
                current.insert(state.name().to_string(), value.clone());
            }
        }

        for state in self.fields.values() {
            if state.role() == FieldRole::Attribute {
                if let Some(value) = state.peek() {
                    attrs.insert(state.name().to_string(), value.clone());
                }
            }
        }

        for index in self.spec.index_defs() {
            self.extend_index_attrs(index, &current, &mut attrs)?;
        }

        if self.spec.index_include_keys() {
            for name in self
                .spec
                .key_order()
                .iter()
                .chain(self.spec.sort_key_order())
            {
                if let Some(value) = current.get(name) {
                    attrs.insert(
                        format!("{COMPONENT_PROJECTION_PREFIX}{name}"),
                        value.clone(),
                    );
                }
            }
        }

        Ok(attrs)
    }

    fn extend_index_attrs(
        &self,
        index: &IndexDef,
        current: &BTreeMap<String, Value>,
        attrs: &mut Attrs,
    ) -> Result<(), Error> {
        if index.partition_materialized {
            let numeric = components_numeric(&self.spec, &index.key_fields);
            if let Some(encoded) =
                encode_components(&self.spec, &index.key_fields, numeric, current)?
            {
                attrs.insert(index.partition_attr.clone(), encoded);
            }
        }
        if let (Some(sort_attr), true) = (&index.sort_attr, index.sort_materialized) {
            let numeric = components_numeric(&self.spec, &index.sort_fields);
            if let Some(encoded) =
                encode_components(&self.spec, &index.sort_fields, numeric, current)?
            {
                attrs.insert(sort_attr.clone(), encoded);
            }
        }
        Ok(())
    }

    fn push_nonexistence_condition(&self, builder: &mut ExprBuilder, now_epoch: i64) {
        push_absence_condition(&self.spec, builder, now_epoch);
    }

    /// Put entry: whole-item write conditioned on the item's access
    /// history (every read field), plus nonexistence for new items.
    pub(crate) fn put_params(&self, now_epoch: i64) -> Result<PutInput, Error> {
        let mut builder = ExprBuilder::new();

        if self.is_new() {
            self.push_nonexistence_condition(&mut builder, now_epoch);
        } else if self.source == ItemSource::CreateOrPut {
            self.push_create_or_put_condition(&mut builder, now_epoch);
        } else {
            for state in self.fields.values() {
                state.emit_condition(&mut builder);
            }
        }

        let condition_expression = builder.condition_expression();
        let (names, values) = builder.into_attribute_maps();

        Ok(PutInput {
            table: self.spec.table().to_string(),
            item: self.physical_item()?,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
        })
    }

    /// Create-or-put: either the row is absent (TTL-expired rows
    /// included), or every original value must still hold.
    fn push_create_or_put_condition(&self, builder: &mut ExprBuilder, now_epoch: i64) {
        let mut clauses = Vec::new();
        for state in self.fields.values() {
            if !state.was_read() || state.is_key() {
                continue;
            }
            let clause = match state.initial() {
                None => builder.not_exists_clause(state.name()),
                Some(initial) => builder.cmp_clause(state.name(), "=", initial.clone()),
            };
            clauses.push(clause);
        }

        if clauses.is_empty() {
            return;
        }

        let absence = absence_clause(&self.spec, builder, now_epoch);
        builder.push_condition(format!("({absence} OR ({}))", clauses.join(" AND ")));
    }

    /// Update entry, or `None` when nothing mutated. Falls back to a
    /// put when the update expression would be empty on a new item
    /// (keys only).
    pub(crate) fn update_params(&self, now_epoch: i64) -> Result<Option<TransactWriteItem>, Error> {
        let mut builder = ExprBuilder::new();

        for state in self.fields.values() {
            state.emit_update(&mut builder);
        }

        let Some(update_expression) = self.with_index_updates(&mut builder)? else {
            if self.is_new() {
                return Ok(Some(TransactWriteItem::Put(self.put_params(now_epoch)?)));
            }
            return Ok(None);
        };

        if self.is_new() {
            self.push_nonexistence_condition(&mut builder, now_epoch);
        } else {
            for state in self.fields.values() {
                state.emit_condition(&mut builder);
            }
        }

        let condition_expression = builder.condition_expression();
        let (names, values) = builder.into_attribute_maps();

        Ok(Some(TransactWriteItem::Update(UpdateInput {
            table: self.spec.table().to_string(),
            key: self.ident.key_attrs(),
            update_expression,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
        })))
    }

    /// Re-materialize index attributes whose components mutated, then
    /// render the final update expression.
    fn with_index_updates(&self, builder: &mut ExprBuilder) -> Result<Option<String>, Error> {
        let mut current = BTreeMap::new();
        for state in self.fields.values() {
            if let Some(value) = state.peek() {
                current.insert(state.name().to_string(), value.clone());
            }
        }

        for index in self.spec.index_defs() {
            let touched = index
                .key_fields
                .iter()
                .chain(&index.sort_fields)
                .any(|name| {
                    self.fields
                        .get(name)
                        .is_some_and(FieldState::mutated)
                });
            if !touched {
                continue;
            }

            let mut emit = |attr: &str, fields: &[String]| -> Result<(), Error> {
                let numeric = components_numeric(&self.spec, fields);
                match encode_components(&self.spec, fields, numeric, &current)? {
                    Some(encoded) => builder.set(attr, encoded),
                    None if index.sparse => builder.remove(attr),
                    None => {
                        return Err(Error::InvalidParameter {
                            name: index.name.clone(),
                            reason: format!(
                                "update touches index '{}' but leaves some of its key \
                                 components undefined",
                                index.name
                            ),
                        });
                    }
                }
                Ok(())
            };

            if index.partition_materialized {
                emit(&index.partition_attr, &index.key_fields)?;
            }
            if let (Some(sort_attr), true) = (&index.sort_attr, index.sort_materialized) {
                emit(sort_attr, &index.sort_fields)?;
            }
        }

        Ok(builder.update_expression())
    }

    /// Delete entry: conditioned on existence plus every read field's
    /// baseline.
    pub(crate) fn delete_params(&self) -> Result<DeleteInput, Error> {
        let mut builder = ExprBuilder::new();
        let exists = builder.exists_clause(PARTITION_KEY_ATTR);
        builder.push_condition(exists);
        for state in self.fields.values() {
            state.emit_condition(&mut builder);
        }

        let condition_expression = builder.condition_expression();
        let (names, values) = builder.into_attribute_maps();

        Ok(DeleteInput {
            table: self.spec.table().to_string(),
            key: self.ident.key_attrs(),
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
        })
    }

    /// Read-only precondition entry, or `None` when the item carries
    /// no conditions.
    pub(crate) fn condition_check_params(&self) -> Option<ConditionCheckInput> {
        let mut builder = ExprBuilder::new();
        for state in self.fields.values() {
            state.emit_condition(&mut builder);
        }

        if !builder.has_conditions() {
            return None;
        }

        let condition_expression = builder.condition_expression()?;
        let (names, values) = builder.into_attribute_maps();

        Some(ConditionCheckInput {
            table: self.spec.table().to_string(),
            key: self.ident.key_attrs(),
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
        })
    }
}

/// Clause asserting that a row does not exist, widened so a row whose
/// TTL lapsed (but which the store has not physically deleted yet)
/// also counts as absent.
pub(crate) fn absence_clause(spec: &ModelSpec, builder: &mut ExprBuilder, now_epoch: i64) -> String {
    let not_exists = builder.not_exists_clause(PARTITION_KEY_ATTR);
    match spec.expire_epoch_field() {
        None => not_exists,
        Some(ttl_field) => {
            let exists = builder.exists_clause(ttl_field);
            let window = builder.between_clause(
                ttl_field,
                Value::Int(now_epoch - TTL_EXPIRY_WINDOW_SECONDS),
                Value::Int(now_epoch),
            );
            format!("({not_exists} OR ({exists} AND {window}))")
        }
    }
}

/// Push the widened nonexistence clause as a standalone condition.
pub(crate) fn push_absence_condition(spec: &ModelSpec, builder: &mut ExprBuilder, now_epoch: i64) {
    let clause = absence_clause(spec, builder, now_epoch);
    builder.push_condition(clause);
}

/// Has this row's TTL lapsed recently enough that the store would have
/// deleted it (or will shortly)?
pub(crate) fn is_expired(spec: &ModelSpec, attrs: &Attrs, now_epoch: i64) -> bool {
    let Some(ttl_field) = spec.expire_epoch_field() else {
        return false;
    };
    let Some(ttl) = attrs.get(ttl_field).and_then(Value::as_i64) else {
        return false;
    };
    ttl <= now_epoch && ttl >= now_epoch - TTL_EXPIRY_WINDOW_SECONDS
}

///
/// ItemHandle
///
/// Shared handle on one tracked item. Cloning shares state; all
/// handles observe every mutation within the owning transaction.
///

#[derive(Clone, Debug)]
pub struct ItemHandle {
    inner: Rc<RefCell<Item>>,
}

impl ItemHandle {
    pub(crate) fn new(item: Item) -> Self {
        Self {
            inner: Rc::new(RefCell::new(item)),
        }
    }

    /// Tracked read: the value is recorded as an optimistic-lock
    /// baseline for commit.
    pub fn get(&self, field: &str) -> Result<Option<Value>, Error> {
        self.inner.borrow_mut().get(field)
    }

    pub fn get_str(&self, field: &str) -> Result<Option<String>, Error> {
        Ok(self
            .get(field)?
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    pub fn get_i64(&self, field: &str) -> Result<Option<i64>, Error> {
        Ok(self.get(field)?.and_then(|value| value.as_i64()))
    }

    pub fn get_f64(&self, field: &str) -> Result<Option<f64>, Error> {
        Ok(self.get(field)?.and_then(|value| value.as_f64()))
    }

    pub fn get_bool(&self, field: &str) -> Result<Option<bool>, Error> {
        Ok(self.get(field)?.and_then(|value| value.as_bool()))
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        self.inner.borrow_mut().set(field, value.into())
    }

    pub fn clear(&self, field: &str) -> Result<(), Error> {
        self.inner.borrow_mut().clear(field)
    }

    pub fn increment_by(&self, field: &str, diff: impl Into<Value>) -> Result<(), Error> {
        self.inner.borrow_mut().increment_by(field, diff.into())
    }

    #[must_use]
    pub fn table(&self) -> String {
        self.inner.borrow().spec().table().to_string()
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.borrow().is_new()
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, Item> {
        self.inner.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, Item> {
        self.inner.borrow_mut()
    }
}
