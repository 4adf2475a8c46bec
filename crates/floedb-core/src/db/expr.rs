//! Expression assembly.
//!
//! Collects attribute-name placeholders (`#n`, one per distinct
//! physical attribute), value placeholders (`:n`, one per literal),
//! update clauses, and condition clauses, then renders the store's
//! expression strings. Emission order is deterministic: clauses render
//! in insertion order, placeholders in allocation order.

use crate::{
    store::{ExprNames, ExprValues},
    value::Value,
};
use std::collections::BTreeMap;

///
/// ExprBuilder
///

#[derive(Debug, Default)]
pub(crate) struct ExprBuilder {
    names: BTreeMap<String, String>,
    name_order: Vec<(String, String)>,
    values: Vec<(String, Value)>,
    sets: Vec<String>,
    removes: Vec<String>,
    conditions: Vec<String>,
}

impl ExprBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Placeholder for one physical attribute name; the same attribute
    /// always maps to the same `#n`.
    pub(crate) fn name(&mut self, attr: &str) -> String {
        if let Some(placeholder) = self.names.get(attr) {
            return placeholder.clone();
        }
        let placeholder = format!("#{}", self.names.len());
        self.names.insert(attr.to_string(), placeholder.clone());
        self.name_order
            .push((placeholder.clone(), attr.to_string()));
        placeholder
    }

    /// Fresh placeholder for one literal value.
    pub(crate) fn value(&mut self, value: Value) -> String {
        let placeholder = format!(":{}", self.values.len());
        self.values.push((placeholder.clone(), value));
        placeholder
    }

    // ------------------------------------------------------------------
    // Update clauses
    // ------------------------------------------------------------------

    pub(crate) fn set(&mut self, attr: &str, value: Value) {
        let name = self.name(attr);
        let value = self.value(value);
        self.sets.push(format!("{name} = {value}"));
    }

    /// `attr = attr + :d`, the unconditioned numeric increment form.
    pub(crate) fn set_add(&mut self, attr: &str, diff: Value) {
        let name = self.name(attr);
        let value = self.value(diff);
        self.sets.push(format!("{name} = {name} + {value}"));
    }

    pub(crate) fn remove(&mut self, attr: &str) {
        let name = self.name(attr);
        self.removes.push(name);
    }

    // ------------------------------------------------------------------
    // Condition clauses
    // ------------------------------------------------------------------

    pub(crate) fn condition_eq(&mut self, attr: &str, value: Value) {
        let clause = self.cmp_clause(attr, "=", value);
        self.conditions.push(clause);
    }

    pub(crate) fn condition_not_exists(&mut self, attr: &str) {
        let clause = self.not_exists_clause(attr);
        self.conditions.push(clause);
    }

    pub(crate) fn push_condition(&mut self, clause: String) {
        self.conditions.push(clause);
    }

    // ------------------------------------------------------------------
    // Clause fragments (used by conditions and iterator expressions)
    // ------------------------------------------------------------------

    pub(crate) fn cmp_clause(&mut self, attr: &str, op: &str, value: Value) -> String {
        let name = self.name(attr);
        let value = self.value(value);
        format!("{name} {op} {value}")
    }

    pub(crate) fn between_clause(&mut self, attr: &str, lo: Value, hi: Value) -> String {
        let name = self.name(attr);
        let lo = self.value(lo);
        let hi = self.value(hi);
        format!("{name} BETWEEN {lo} AND {hi}")
    }

    pub(crate) fn begins_with_clause(&mut self, attr: &str, prefix: Value) -> String {
        let name = self.name(attr);
        let prefix = self.value(prefix);
        format!("begins_with({name}, {prefix})")
    }

    pub(crate) fn contains_clause(&mut self, attr: &str, operand: Value) -> String {
        let name = self.name(attr);
        let operand = self.value(operand);
        format!("contains({name}, {operand})")
    }

    pub(crate) fn exists_clause(&mut self, attr: &str) -> String {
        let name = self.name(attr);
        format!("attribute_exists({name})")
    }

    pub(crate) fn not_exists_clause(&mut self, attr: &str) -> String {
        let name = self.name(attr);
        format!("attribute_not_exists({name})")
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// `SET …` / `REMOVE …` rendering; `None` when no mutation was
    /// recorded (the caller treats that as "nothing to update").
    pub(crate) fn update_expression(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.sets.is_empty() {
            parts.push(format!("SET {}", self.sets.join(", ")));
        }
        if !self.removes.is_empty() {
            parts.push(format!("REMOVE {}", self.removes.join(", ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub(crate) fn condition_expression(&self) -> Option<String> {
        if self.conditions.is_empty() {
            None
        } else {
            Some(self.conditions.join(" AND "))
        }
    }

    #[must_use]
    pub(crate) fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Final `#n` → physical-name and `:n` → literal maps. Only
    /// placeholders that were actually allocated appear.
    pub(crate) fn into_attribute_maps(self) -> (ExprNames, ExprValues) {
        let names = self
            .name_order
            .into_iter()
            .collect::<ExprNames>();
        let values = self.values.into_iter().collect::<ExprValues>();
        (names, values)
    }
}

///
/// TESTS
///
