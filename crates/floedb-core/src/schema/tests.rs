use crate::{
    error::Error,
    schema::{Constraint, FieldSchema, IndexSchema, ModelSchema, ModelSpec},
    value::Value,
};

fn base_model() -> ModelSchema {
    ModelSchema::new("orders")
        .key("id", FieldSchema::str())
        .field("amount", FieldSchema::int().default_value(0))
        .field("note", FieldSchema::str().optional())
}

#[test]
fn compile_accepts_a_minimal_model() {
    let spec = ModelSpec::compile(base_model()).expect("minimal model should compile");
    assert_eq!(spec.table(), "orders");
    assert_eq!(spec.key_order(), ["id"]);
    assert!(!spec.has_sort_key());
}

#[test]
fn compile_rejects_empty_partition_key() {
    let err = ModelSpec::compile(ModelSchema::new("orders").field("a", FieldSchema::int()))
        .expect_err("model without KEY should be rejected");
    assert!(matches!(err, Error::InvalidParameter { name, .. } if name == "KEY"));
}

#[test]
fn compile_rejects_partition_key_default() {
    let schema = ModelSchema::new("orders").key("id", FieldSchema::str().default_value("x"));
    let err = ModelSpec::compile(schema).expect_err("key default should be rejected");
    assert!(matches!(err, Error::InvalidParameter { name, .. } if name == "id"));
}

#[test]
fn compile_rejects_optional_key_components() {
    let schema = ModelSchema::new("orders")
        .key("id", FieldSchema::str())
        .sort_key("seq", FieldSchema::int().optional());
    let err = ModelSpec::compile(schema).expect_err("optional sort key should be rejected");
    assert!(matches!(err, Error::InvalidParameter { name, .. } if name == "seq"));
}

#[test]
fn compile_forces_key_components_immutable() {
    let spec = ModelSpec::compile(base_model()).unwrap();
    assert!(spec.field_def("id").unwrap().schema.is_immutable());
}

#[test]
fn compile_rejects_underscore_and_reserved_names() {
    let underscore = base_model().field("_hidden", FieldSchema::int());
    assert!(ModelSpec::compile(underscore).is_err());

    let reserved = base_model().field("get", FieldSchema::int());
    assert!(ModelSpec::compile(reserved).is_err());
}

#[test]
fn compile_rejects_name_reuse_across_sections() {
    let schema = ModelSchema::new("orders")
        .key("id", FieldSchema::str())
        .field("id", FieldSchema::int());
    let err = ModelSpec::compile(schema).expect_err("duplicate name should be rejected");
    assert!(matches!(err, Error::InvalidParameter { name, .. } if name == "id"));
}

#[test]
fn compile_rejects_non_numeric_ttl_field() {
    let schema = base_model()
        .field("expires", FieldSchema::str())
        .expire_epoch_field("expires");
    assert!(ModelSpec::compile(schema).is_err());

    let missing = base_model().expire_epoch_field("absent");
    assert!(ModelSpec::compile(missing).is_err());
}

#[test]
fn compile_rejects_index_on_undeclared_field() {
    let schema = base_model().index("byGhost", IndexSchema::new(["ghost"]));
    let err = ModelSpec::compile(schema).expect_err("undeclared index field");
    assert!(matches!(err, Error::InvalidIndex { index, .. } if index == "byGhost"));
}

#[test]
fn compile_rejects_optional_key_on_dense_index() {
    let schema = base_model().index("byNote", IndexSchema::new(["note"]));
    assert!(ModelSpec::compile(schema).is_err());

    let sparse = base_model().index("byNote", IndexSchema::new(["note"]).sparse());
    assert!(ModelSpec::compile(sparse).is_ok());
}

#[test]
fn compile_rejects_include_only_duplicating_index_key() {
    let schema = base_model().index(
        "byAmount",
        IndexSchema::new(["amount"]).include_only(["amount"]),
    );
    assert!(ModelSpec::compile(schema).is_err());
}

#[test]
fn compiled_index_resolves_physical_attr_names() {
    let schema = base_model()
        .field("region", FieldSchema::str())
        .index("byAmount", IndexSchema::new(["amount"]).sort_key(["id"]))
        .index("byRegionAmount", IndexSchema::new(["region", "amount"]));
    let spec = ModelSpec::compile(schema).unwrap();

    // single non-key field: the index targets the attribute directly
    let by_amount = spec.index_def("byAmount").unwrap();
    assert_eq!(by_amount.partition_attr, "amount");
    assert!(!by_amount.partition_materialized);
    // key component in sort position: materialized compound attribute
    assert_eq!(by_amount.sort_attr.as_deref(), Some("_byAmount_sk"));
    assert!(by_amount.sort_materialized);

    // multi-component key: materialized compound attribute
    let compound = spec.index_def("byRegionAmount").unwrap();
    assert_eq!(compound.partition_attr, "_byRegionAmount_id");
    assert!(compound.partition_materialized);
}

#[test]
fn numeric_key_detection_honors_string_sort_key_flag() {
    let numeric = ModelSchema::new("events")
        .key("kind", FieldSchema::str())
        .sort_key("at", FieldSchema::int());
    let spec = ModelSpec::compile(numeric.clone()).unwrap();
    assert!(spec.sort_key_numeric());
    assert!(!spec.partition_key_numeric());

    let opted_out = ModelSpec::compile(numeric.string_sort_key()).unwrap();
    assert!(!opted_out.sort_key_numeric());
}

#[test]
fn field_validation_applies_kind_and_constraints() {
    let schema = FieldSchema::int()
        .check(Constraint::Min(0.0))
        .check(Constraint::Max(10.0));

    assert!(schema.validate("n", &Value::Int(5)).is_ok());
    assert!(schema.validate("n", &Value::Int(-1)).is_err());
    assert!(schema.validate("n", &Value::Str("5".into())).is_err());
}
