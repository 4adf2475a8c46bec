use crate::{
    db::{
        field::ItemSource,
        item::Item,
        key::{decode_partition_key, encode_partition_key},
    },
    schema::{FieldSchema, ModelSchema, ModelSpec},
    store::{Attrs, ExprNames, TransactWriteItem},
    value::Value,
};
use proptest::prelude::*;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

const NOW: i64 = 1_700_000_000;

fn tracked_spec() -> Arc<ModelSpec> {
    Arc::new(
        ModelSpec::compile(
            ModelSchema::new("tracked")
                .key("id", FieldSchema::str())
                .field("x", FieldSchema::int())
                .field("y", FieldSchema::int())
                .field("z", FieldSchema::int()),
        )
        .expect("spec should compile"),
    )
}

fn loaded_item(spec: &Arc<ModelSpec>) -> Item {
    let mut attrs = Attrs::new();
    attrs.insert("_id".to_string(), Value::Str("a".into()));
    attrs.insert("x".to_string(), Value::Int(1));
    attrs.insert("y".to_string(), Value::Int(2));
    attrs.insert("z".to_string(), Value::Int(3));
    Item::from_store_attrs(spec, ItemSource::Get, &attrs).expect("item should materialize")
}

/// Attributes referenced by `#n` placeholders in an expression.
fn referenced_attrs(expression: &str, names: &ExprNames) -> BTreeSet<String> {
    let bytes = expression.as_bytes();
    let mut out = BTreeSet::new();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'#' {
            let start = idx;
            idx += 1;
            while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
                idx += 1;
            }
            if let Some(attr) = names.get(&expression[start..idx]) {
                out.insert(attr.clone());
            }
        } else {
            idx += 1;
        }
    }
    out
}

#[derive(Clone, Debug)]
enum Op {
    Read,
    Write(i64),
    Increment(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Read),
        (-100i64..100).prop_map(Op::Write),
        (-100i64..100).prop_map(Op::Increment),
    ]
}

const FIELDS: [&str; 3] = ["x", "y", "z"];

proptest! {
    /// The emitted condition expression references the baseline for
    /// exactly the fields that were read.
    #[test]
    fn conditions_cover_exactly_the_read_fields(
        ops in prop::collection::vec((0usize..3, arb_op()), 0..20)
    ) {
        let spec = tracked_spec();
        let mut item = loaded_item(&spec);

        let mut read = [false; 3];
        let mut written = [false; 3];

        for (slot, op) in &ops {
            let field = FIELDS[*slot];
            match op {
                Op::Read => {
                    item.get(field).expect("declared field");
                    if !written[*slot] {
                        read[*slot] = true;
                    }
                }
                Op::Write(value) => {
                    item.set(field, Value::Int(*value)).expect("int accepts int");
                    written[*slot] = true;
                }
                Op::Increment(diff) => {
                    item.increment_by(field, Value::Int(*diff)).expect("numeric");
                    if read[*slot] || written[*slot] {
                        written[*slot] = true;
                    }
                }
            }
        }

        let expected: BTreeSet<String> = FIELDS
            .iter()
            .enumerate()
            .filter_map(|(slot, field)| read[slot].then(|| (*field).to_string()))
            .collect();

        let conditioned = match item.update_params(NOW).expect("emission succeeds") {
            Some(TransactWriteItem::Update(input)) => input
                .condition_expression
                .map(|expression| {
                    referenced_attrs(&expression, &input.expression_attribute_names)
                })
                .unwrap_or_default(),
            Some(other) => panic!("loaded items update, got {other:?}"),
            None => item.condition_check_params().map_or_else(BTreeSet::new, |input| {
                referenced_attrs(
                    &input.condition_expression,
                    &input.expression_attribute_names,
                )
            }),
        };

        prop_assert_eq!(conditioned, expected);
    }
}

fn key_spec() -> Arc<ModelSpec> {
    Arc::new(
        ModelSpec::compile(
            ModelSchema::new("keys")
                .key("a", FieldSchema::str())
                .key("b", FieldSchema::int()),
        )
        .expect("spec should compile"),
    )
}

fn string_pair_spec() -> Arc<ModelSpec> {
    Arc::new(
        ModelSpec::compile(
            ModelSchema::new("pairs")
                .key("a", FieldSchema::str())
                .key("b", FieldSchema::str()),
        )
        .expect("spec should compile"),
    )
}

fn component(value: &str, number: i64) -> BTreeMap<String, Value> {
    let mut vals = BTreeMap::new();
    vals.insert("a".to_string(), Value::Str(value.to_string()));
    vals.insert("b".to_string(), Value::Int(number));
    vals
}

proptest! {
    /// decode(encode(V)) == V, and encode is injective.
    #[test]
    fn key_codec_round_trips_and_is_injective(
        a1 in "[a-zA-Z0-9 .-]{0,8}",
        n1 in -1_000_000i64..1_000_000,
        a2 in "[a-zA-Z0-9 .-]{0,8}",
        n2 in -1_000_000i64..1_000_000,
    ) {
        let spec = key_spec();

        let first = component(&a1, n1);
        let encoded = encode_partition_key(&spec, &first).expect("encodes");
        let decoded = decode_partition_key(&spec, &encoded).expect("decodes");
        prop_assert_eq!(&decoded, &first);

        let second = component(&a2, n2);
        let encoded_second = encode_partition_key(&spec, &second).expect("encodes");
        if first != second {
            prop_assert_ne!(encoded, encoded_second);
        }
    }

    /// Componentwise order of string tuples matches lexicographic
    /// order of their encodings.
    #[test]
    fn string_tuple_order_survives_encoding(
        a1 in "[a-z]{0,6}",
        b1 in "[a-z]{0,6}",
        a2 in "[a-z]{0,6}",
        b2 in "[a-z]{0,6}",
    ) {
        let spec = string_pair_spec();

        let mut lhs = BTreeMap::new();
        lhs.insert("a".to_string(), Value::Str(a1.clone()));
        lhs.insert("b".to_string(), Value::Str(b1.clone()));
        let mut rhs = BTreeMap::new();
        rhs.insert("a".to_string(), Value::Str(a2.clone()));
        rhs.insert("b".to_string(), Value::Str(b2.clone()));

        let lhs_encoded = match encode_partition_key(&spec, &lhs).expect("encodes") {
            Value::Str(s) => s,
            other => panic!("string tuples encode to strings, got {other:?}"),
        };
        let rhs_encoded = match encode_partition_key(&spec, &rhs).expect("encodes") {
            Value::Str(s) => s,
            other => panic!("string tuples encode to strings, got {other:?}"),
        };

        prop_assert_eq!(
            (a1, b1) < (a2, b2),
            lhs_encoded < rhs_encoded,
            "componentwise and encoded orders must agree"
        );
    }

    /// N unread increments collapse to one `SET n = n + :sum` with no
    /// condition.
    #[test]
    fn unread_increments_sum_into_one_clause(
        diffs in prop::collection::vec(-1000i64..1000, 1..10)
    ) {
        let spec = tracked_spec();
        let mut item = loaded_item(&spec);

        for diff in &diffs {
            item.increment_by("x", Value::Int(*diff)).expect("numeric");
        }

        let sum: i64 = diffs.iter().sum();
        match item.update_params(NOW).expect("emission succeeds") {
            Some(TransactWriteItem::Update(input)) => {
                prop_assert_ne!(sum, 0);
                prop_assert_eq!(input.condition_expression, None);
                let expression = input.update_expression;
                prop_assert!(
                    expression.contains("+"),
                    "expected self-add, got '{}'",
                    expression
                );
                let values: Vec<&Value> =
                    input.expression_attribute_values.values().collect();
                let expected_sum = Value::Int(sum);
                prop_assert_eq!(values, vec![&expected_sum]);
            }
            // A zero net diff leaves the item clean.
            None => prop_assert_eq!(sum, 0),
            Some(other) => panic!("expected an update entry, got {other:?}"),
        }
    }
}
