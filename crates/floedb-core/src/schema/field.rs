use crate::{
    error::Error,
    value::{Value, ValueKind},
};

///
/// FieldKind
///
/// Declared shape of one attribute. `Obj`/`Arr` are the structural
/// kinds whose mutation detection uses deep equality.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Str,
    Bool,
    Int,
    Float,
    Obj,
    Arr,
}

impl FieldKind {
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Obj | Self::Arr)
    }

    /// Does a runtime value have this declared shape? `Int` values are
    /// accepted where `Float` is declared (integral literals are legal
    /// numeric input), never the reverse.
    #[must_use]
    pub const fn admits(self, value: &Value) -> bool {
        match self {
            Self::Str => matches!(value, Value::Str(_)),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Int => matches!(value, Value::Int(_)),
            Self::Float => matches!(value, Value::Int(_) | Value::Float(_)),
            Self::Obj => matches!(value, Value::Map(_)),
            Self::Arr => matches!(value, Value::List(_)),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Obj => "object",
            Self::Arr => "array",
        }
    }

    #[must_use]
    pub const fn value_kind_label(value: &Value) -> &'static str {
        match value.kind() {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::List => "array",
            ValueKind::Map => "object",
        }
    }
}

///
/// Constraint
///
/// Declared value constraints, compiled into the field validator. This
/// is the seam where an external schema-validation engine would plug
/// in; the built-in set covers the constraints the runtime itself
/// relies on.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Inclusive numeric lower bound.
    Min(f64),
    /// Inclusive numeric upper bound.
    Max(f64),
    /// Minimum string length in bytes.
    MinLength(usize),
    /// Maximum string length in bytes.
    MaxLength(usize),
    /// Closed set of admissible values.
    OneOf(Vec<Value>),
}

impl Constraint {
    fn check(&self, field: &str, value: &Value) -> Result<(), Error> {
        let ok = match self {
            Self::Min(bound) => value.as_f64().is_none_or(|n| n >= *bound),
            Self::Max(bound) => value.as_f64().is_none_or(|n| n <= *bound),
            Self::MinLength(bound) => value.as_str().is_none_or(|s| s.len() >= *bound),
            Self::MaxLength(bound) => value.as_str().is_none_or(|s| s.len() <= *bound),
            Self::OneOf(allowed) => allowed.contains(value),
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidField {
                field: field.to_string(),
                reason: format!("value {value:?} violates constraint {self:?}"),
            })
        }
    }
}

///
/// FieldSchema
///
/// Declared schema for one attribute: shape, optionality, immutability,
/// default, and the compiled constraint set.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    kind: FieldKind,
    optional: bool,
    immutable: bool,
    default: Option<Value>,
    constraints: Vec<Constraint>,
}

impl FieldSchema {
    #[must_use]
    const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
            immutable: false,
            default: None,
            constraints: Vec::new(),
        }
    }

    #[must_use]
    pub const fn str() -> Self {
        Self::new(FieldKind::Str)
    }

    #[must_use]
    pub const fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    #[must_use]
    pub const fn int() -> Self {
        Self::new(FieldKind::Int)
    }

    #[must_use]
    pub const fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    #[must_use]
    pub const fn obj() -> Self {
        Self::new(FieldKind::Obj)
    }

    #[must_use]
    pub const fn arr() -> Self {
        Self::new(FieldKind::Arr)
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn check(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    #[must_use]
    pub const fn is_immutable(&self) -> bool {
        self.immutable
    }

    #[must_use]
    pub const fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Mark a key component immutable during model compilation.
    pub(crate) const fn force_immutable(&mut self) {
        self.immutable = true;
    }

    /// Run the compiled validator against one value.
    pub fn validate(&self, field: &str, value: &Value) -> Result<(), Error> {
        if !self.kind.admits(value) {
            return Err(Error::InvalidField {
                field: field.to_string(),
                reason: format!(
                    "expected {}, got {}",
                    self.kind.label(),
                    FieldKind::value_kind_label(value)
                ),
            });
        }

        for constraint in &self.constraints {
            constraint.check(field, value)?;
        }

        Ok(())
    }
}
