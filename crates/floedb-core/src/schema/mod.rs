mod field;
mod index;
mod model;
mod spec;

#[cfg(test)]
mod tests;

pub use field::{Constraint, FieldKind, FieldSchema};
pub use index::IndexSchema;
pub use model::ModelSchema;
pub use spec::{FieldDef, FieldRole, IndexDef, ModelSpec};
