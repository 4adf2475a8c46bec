//! Store contract.
//!
//! The narrow boundary between the mapper core and whatever actually
//! holds the data. The shapes mirror a conditional-write document
//! store: per-item reads/writes with condition expressions, atomic
//! multi-item transactions, batched reads with unprocessed-key
//! retry, and index queries/scans with pagination.
//!
//! The core never interprets expressions itself; it only emits them.
//! `memory::MemoryStore` is the in-tree implementation; adapters for
//! real SDKs live outside this crate.

mod error;
pub mod memory;

pub use error::{CancellationReason, StoreError};

use crate::{PARTITION_KEY_ATTR, SORT_KEY_ATTR, value::Value};
use std::collections::BTreeMap;

/// One item's attributes keyed by physical attribute name.
pub type Attrs = BTreeMap<String, Value>;

/// Expression attribute name map (`#n` → physical name).
pub type ExprNames = BTreeMap<String, String>;

/// Expression attribute value map (`:n` → literal).
pub type ExprValues = BTreeMap<String, Value>;

///
/// GetInput / GetOutput
///

#[derive(Clone, Debug)]
pub struct GetInput {
    pub table: String,
    pub key: Attrs,
    pub consistent_read: bool,
}

#[derive(Clone, Debug)]
pub struct GetOutput {
    pub item: Option<Attrs>,
}

///
/// TransactGetInput / TransactGetOutput
///
/// Atomic multi-get; responses align with requests by position.
///

#[derive(Clone, Debug)]
pub struct TransactGetInput {
    pub gets: Vec<GetInput>,
}

#[derive(Clone, Debug)]
pub struct TransactGetOutput {
    pub responses: Vec<Option<Attrs>>,
}

///
/// BatchGetInput / BatchGetOutput
///
/// Non-atomic multi-get. The store may leave keys unprocessed; callers
/// re-submit them until drained.
///

#[derive(Clone, Debug)]
pub struct BatchGetRequest {
    pub table: String,
    pub keys: Vec<Attrs>,
    pub consistent_read: bool,
}

#[derive(Clone, Debug)]
pub struct BatchGetInput {
    pub requests: Vec<BatchGetRequest>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<String, Vec<Attrs>>,
    pub unprocessed: Vec<BatchGetRequest>,
}

///
/// Write inputs
///

#[derive(Clone, Debug)]
pub struct PutInput {
    pub table: String,
    pub item: Attrs,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
}

#[derive(Clone, Debug)]
pub struct UpdateInput {
    pub table: String,
    pub key: Attrs,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
}

#[derive(Clone, Debug)]
pub struct DeleteInput {
    pub table: String,
    pub key: Attrs,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
}

#[derive(Clone, Debug)]
pub struct ConditionCheckInput {
    pub table: String,
    pub key: Attrs,
    pub condition_expression: String,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
}

///
/// TransactWriteItem / TransactWriteInput
///

#[derive(Clone, Debug)]
pub enum TransactWriteItem {
    Put(PutInput),
    Update(UpdateInput),
    Delete(DeleteInput),
    ConditionCheck(ConditionCheckInput),
}

impl TransactWriteItem {
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Put(input) => &input.table,
            Self::Update(input) => &input.table,
            Self::Delete(input) => &input.table,
            Self::ConditionCheck(input) => &input.table,
        }
    }

    /// Primary-key attributes identifying the target row. For a Put the
    /// key is extracted from the item payload.
    #[must_use]
    pub fn key_attrs(&self) -> Attrs {
        match self {
            Self::Put(input) => [PARTITION_KEY_ATTR, SORT_KEY_ATTR]
                .iter()
                .filter_map(|name| {
                    input
                        .item
                        .get(*name)
                        .map(|value| ((*name).to_string(), value.clone()))
                })
                .collect(),
            Self::Update(input) => input.key.clone(),
            Self::Delete(input) => input.key.clone(),
            Self::ConditionCheck(input) => input.key.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransactWriteInput {
    pub items: Vec<TransactWriteItem>,
}

///
/// ScanInput / QueryInput / PageOutput
///

#[derive(Clone, Debug)]
pub struct ScanInput {
    pub table: String,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
    pub consistent_read: bool,
    pub limit: u32,
    pub exclusive_start_key: Option<Attrs>,
    pub segment: Option<u32>,
    pub total_segments: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct QueryInput {
    pub table: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: ExprNames,
    pub expression_attribute_values: ExprValues,
    pub consistent_read: bool,
    pub limit: u32,
    pub exclusive_start_key: Option<Attrs>,
    pub forward: bool,
}

#[derive(Clone, Debug)]
pub struct PageOutput {
    pub items: Vec<Attrs>,
    pub last_evaluated_key: Option<Attrs>,
}

///
/// Store
///
/// Object-safe synchronous contract. Implementations must be shareable
/// across threads; every call is a blocking point for the caller's
/// transaction and nothing else.
///

pub trait Store: Send + Sync {
    fn get(&self, input: GetInput) -> Result<GetOutput, StoreError>;

    fn transact_get(&self, input: TransactGetInput) -> Result<TransactGetOutput, StoreError>;

    fn batch_get(&self, input: BatchGetInput) -> Result<BatchGetOutput, StoreError>;

    fn put(&self, input: PutInput) -> Result<(), StoreError>;

    fn update(&self, input: UpdateInput) -> Result<(), StoreError>;

    fn delete(&self, input: DeleteInput) -> Result<(), StoreError>;

    fn transact_write(&self, input: TransactWriteInput) -> Result<(), StoreError>;

    fn scan(&self, input: ScanInput) -> Result<PageOutput, StoreError>;

    fn query(&self, input: QueryInput) -> Result<PageOutput, StoreError>;
}
