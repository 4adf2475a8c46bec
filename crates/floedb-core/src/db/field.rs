//! Per-field runtime state.
//!
//! Each item attribute tracks its current value, the baseline observed
//! in the store, read/write flags, and any pending numeric increment.
//! That access history is what the emission layer turns into minimal
//! update and condition expressions.

use crate::{
    db::expr::ExprBuilder,
    error::Error,
    schema::{FieldDef, FieldRole},
    value::Value,
};

///
/// ItemSource
///
/// How an item entered the transaction. Drives default application,
/// validation breadth, and condition-failure classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemSource {
    Create,
    CreateOrPut,
    Update,
    Delete,
    Get,
    Scan,
}

impl ItemSource {
    /// Sources whose items were materialized from a store payload.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Get | Self::Scan)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateOrPut => "create_or_put",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Get => "get",
            Self::Scan => "scan",
        }
    }
}

///
/// FieldState
///

#[derive(Clone, Debug)]
pub(crate) struct FieldState {
    def: FieldDef,
    value: Option<Value>,
    initial: Option<Value>,
    read: bool,
    written: bool,
    /// Accumulated increment, only ever set while the field is
    /// otherwise untouched.
    diff: Option<Value>,
    may_have_mutated: bool,
}

impl FieldState {
    /// Materialize one field. `caller_value` is the user-supplied or
    /// store-loaded value; `from_store` says the item itself was
    /// loaded, which makes `caller_value` the optimistic-lock
    /// baseline.
    pub(crate) fn new(
        def: &FieldDef,
        source: ItemSource,
        caller_value: Option<Value>,
        from_store: bool,
    ) -> Self {
        let initial = if from_store {
            caller_value.clone()
        } else {
            None
        };

        let absent_optional_from_store =
            from_store && caller_value.is_none() && def.schema.is_optional();

        let value = caller_value.or_else(|| {
            if source == ItemSource::Update || absent_optional_from_store {
                None
            } else {
                def.schema.default().cloned()
            }
        });

        let may_have_mutated = value.is_some() && initial.is_none();

        Self {
            def: def.clone(),
            value,
            initial,
            read: false,
            written: false,
            diff: None,
            may_have_mutated,
        }
    }

    #[must_use]
    pub(crate) fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub(crate) const fn is_key(&self) -> bool {
        self.def.role.is_key()
    }

    // ------------------------------------------------------------------
    // Access operations
    // ------------------------------------------------------------------

    /// Current value; reading marks the field for optimistic locking
    /// unless it has already been overwritten this transaction.
    pub(crate) fn get(&mut self) -> Option<Value> {
        if !self.written {
            self.read = true;
            self.may_have_mutated = true;
        }
        self.value.clone()
    }

    /// Current value without recording an access.
    #[must_use]
    pub(crate) const fn peek(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub(crate) const fn initial(&self) -> Option<&Value> {
        self.initial.as_ref()
    }

    pub(crate) fn set(&mut self, value: Value) -> Result<(), Error> {
        if self.def.schema.is_immutable() && self.value.is_some() {
            return Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "field is immutable and already initialized".to_string(),
            });
        }

        // Validate before touching state so a rejected value leaves the
        // prior value and written flag intact.
        self.def.schema.validate(&self.def.name, &value)?;

        self.value = Some(value);
        self.written = true;
        self.diff = None;
        self.may_have_mutated = true;
        Ok(())
    }

    /// Drop the current value; emits REMOVE on commit. Required fields
    /// are caught by full validation, not here.
    pub(crate) fn clear(&mut self) -> Result<(), Error> {
        if self.def.schema.is_immutable() && self.value.is_some() {
            return Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "field is immutable and already initialized".to_string(),
            });
        }
        self.value = None;
        self.written = true;
        self.diff = None;
        self.may_have_mutated = true;
        Ok(())
    }

    /// Accumulate a numeric increment. Degrades to a plain tracked
    /// write once the field has been read or written.
    pub(crate) fn increment_by(&mut self, diff: Value) -> Result<(), Error> {
        if !self.def.schema.kind().is_numeric() {
            return Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "increment_by requires a numeric field".to_string(),
            });
        }
        if !diff.is_numeric() {
            return Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "increment amount must be numeric".to_string(),
            });
        }

        let Some(current) = self.value.clone() else {
            return Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "cannot increment an undefined value".to_string(),
            });
        };

        let next = current
            .checked_add(&diff)
            .ok_or_else(|| Error::InvalidField {
                field: self.def.name.clone(),
                reason: "increment overflows".to_string(),
            })?;

        if self.read || self.written {
            return self.set(next);
        }

        self.def.schema.validate(&self.def.name, &next)?;
        let accumulated = match self.diff.take() {
            Some(prior) => prior
                .checked_add(&diff)
                .ok_or_else(|| Error::InvalidField {
                    field: self.def.name.clone(),
                    reason: "increment overflows".to_string(),
                })?,
            None => diff,
        };
        self.diff = Some(accumulated);
        self.value = Some(next);
        self.may_have_mutated = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    #[must_use]
    pub(crate) const fn was_read(&self) -> bool {
        self.read
    }

    /// Force the optimistic-lock condition as if the caller had read
    /// the given baseline (update/create-or-put paths).
    pub(crate) fn assume_initial(&mut self, initial: Option<Value>) {
        self.initial = initial;
        self.read = true;
        self.may_have_mutated = true;
    }

    #[must_use]
    pub(crate) fn mutated(&self) -> bool {
        if !self.may_have_mutated {
            return false;
        }
        self.value != self.initial
    }

    #[must_use]
    pub(crate) fn can_update_without_condition(&self) -> bool {
        !self.is_key() && !(self.read && !self.written)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate the current value if one is present.
    pub(crate) fn validate_present(&self) -> Result<(), Error> {
        match &self.value {
            Some(value) => self.def.schema.validate(&self.def.name, value),
            None => Ok(()),
        }
    }

    /// Validate, also requiring a value unless the field is optional.
    pub(crate) fn validate_full(&self) -> Result<(), Error> {
        match &self.value {
            Some(value) => self.def.schema.validate(&self.def.name, value),
            None if self.def.schema.is_optional() => Ok(()),
            None => Err(Error::InvalidField {
                field: self.def.name.clone(),
                reason: "required field is missing".to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Expression emission
    // ------------------------------------------------------------------

    /// Contribute this field's update clause, if it mutated.
    pub(crate) fn emit_update(&self, builder: &mut ExprBuilder) {
        if self.is_key() || !self.mutated() {
            return;
        }

        match &self.value {
            None => builder.remove(&self.def.name),
            Some(value) => {
                // A pending diff implies the field was never written,
                // so the gate reduces to "never read".
                let unconditioned_increment = self.diff.is_some()
                    && self.can_update_without_condition()
                    && self.initial.is_some();
                if unconditioned_increment {
                    // diff checked Some above
                    if let Some(diff) = &self.diff {
                        builder.set_add(&self.def.name, diff.clone());
                    }
                } else {
                    builder.set(&self.def.name, value.clone());
                }
            }
        }
    }

    /// Contribute this field's optimistic-lock condition. Only fields
    /// that were read carry one; a blind write needs no baseline.
    pub(crate) fn emit_condition(&self, builder: &mut ExprBuilder) {
        if !self.read || self.is_key() {
            return;
        }

        match &self.initial {
            None => builder.condition_not_exists(&self.def.name),
            Some(initial) => builder.condition_eq(&self.def.name, initial.clone()),
        }
    }
}

// Keys never mutate, so role only matters for emission short-circuits.
impl FieldState {
    #[must_use]
    pub(crate) const fn role(&self) -> FieldRole {
        self.def.role
    }
}

///
/// TESTS
///
