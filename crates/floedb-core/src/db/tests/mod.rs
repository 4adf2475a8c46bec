mod properties;
mod scenarios;

use crate::{
    db::{Db, Model},
    schema::{FieldSchema, ModelSchema},
    store::memory::MemoryStore,
};

/// KEY {id: str}, FIELDS {n: int default 5, note: optional str}.
pub(super) fn orders_model(db: &Db, store: &MemoryStore) -> Model {
    let model = db
        .model(
            ModelSchema::new("orders")
                .key("id", FieldSchema::str())
                .field("n", FieldSchema::int().default_value(5))
                .field("note", FieldSchema::str().optional()),
        )
        .expect("orders model should compile");
    store.create_table_for(model.spec());
    model
}

/// KEY {a: str}, SORT_KEY {b: str}.
pub(super) fn pairs_model(db: &Db, store: &MemoryStore) -> Model {
    let model = db
        .model(
            ModelSchema::new("pairs")
                .key("a", FieldSchema::str())
                .sort_key("b", FieldSchema::str()),
        )
        .expect("pairs model should compile");
    store.create_table_for(model.spec());
    model
}
