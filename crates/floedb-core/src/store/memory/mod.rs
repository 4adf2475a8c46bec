//! In-memory store.
//!
//! A faithful stand-in for the real backend: conditional single-item
//! writes, all-or-nothing multi-item transactions with per-entry
//! cancellation reasons, sparse secondary-index views, deterministic
//! parallel-scan sharding, and pagination. Conditions, filters, and
//! update expressions run through the `expr` interpreter, so the
//! mapper's emitted expressions are exercised end to end.

mod expr;


use crate::{
    PARTITION_KEY_ATTR, SORT_KEY_ATTR,
    schema::ModelSpec,
    store::{
        Attrs, BatchGetInput, BatchGetOutput, BatchGetRequest, CancellationReason,
        ConditionCheckInput, DeleteInput, GetInput, GetOutput, PageOutput, PutInput, QueryInput,
        ScanInput, Store, StoreError, TransactGetInput, TransactGetOutput, TransactWriteInput,
        TransactWriteItem, UpdateInput,
    },
    value::{KeyValue, to_canonical_json},
};
use expr::{Cond, apply_update, parse_condition, parse_update};
use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Mutex,
};

type RowKey = (KeyValue, Option<KeyValue>);

///
/// IndexKeys / TableDef
///
/// Table shape registered at store construction; provisioning proper
/// stays outside the core.
///

#[derive(Clone, Debug)]
pub struct IndexKeys {
    pub partition_attr: String,
    pub sort_attr: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TableDef {
    pub name: String,
    pub indexes: BTreeMap<String, IndexKeys>,
}

impl TableDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn index(
        mut self,
        name: impl Into<String>,
        partition_attr: impl Into<String>,
        sort_attr: Option<String>,
    ) -> Self {
        self.indexes.insert(
            name.into(),
            IndexKeys {
                partition_attr: partition_attr.into(),
                sort_attr,
            },
        );
        self
    }
}

#[derive(Debug, Default)]
struct TableData {
    indexes: BTreeMap<String, IndexKeys>,
    rows: BTreeMap<RowKey, Attrs>,
}

///
/// MemoryStore
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, TableData>>,
    /// Rounds of `batch_get` that will deliberately leave keys
    /// unprocessed, for exercising the caller's retry loop.
    unprocessed_rounds: Mutex<u32>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, def: TableDef) {
        let mut tables = self.tables.lock().expect("store lock poisoned");
        tables.insert(
            def.name.clone(),
            TableData {
                indexes: def.indexes,
                rows: BTreeMap::new(),
            },
        );
    }

    /// Convenience: derive the table definition from a compiled model.
    pub fn create_table_for(&self, spec: &ModelSpec) {
        let mut def = TableDef::new(spec.table());
        for index in spec.index_defs() {
            def = def.index(
                index.name.clone(),
                index.partition_attr.clone(),
                index.sort_attr.clone(),
            );
        }
        self.create_table(def);
    }

    /// Make the next `rounds` batched reads return all but one key
    /// unprocessed.
    pub fn inject_unprocessed_rounds(&self, rounds: u32) {
        *self.unprocessed_rounds.lock().expect("store lock poisoned") = rounds;
    }

    /// Raw row lookup for assertions.
    #[must_use]
    pub fn raw_item(&self, table: &str, key: &Attrs) -> Option<Attrs> {
        let tables = self.tables.lock().expect("store lock poisoned");
        let data = tables.get(table)?;
        let row_key = row_key_of(key).ok()?;
        data.rows.get(&row_key).cloned()
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().expect("store lock poisoned");
        tables.get(table).map_or(0, |data| data.rows.len())
    }
}

fn row_key_of(key: &Attrs) -> Result<RowKey, StoreError> {
    let id = key
        .get(PARTITION_KEY_ATTR)
        .cloned()
        .ok_or_else(|| StoreError::Validation {
            message: "request key is missing the partition attribute".to_string(),
        })?;
    Ok((
        KeyValue::from(id),
        key.get(SORT_KEY_ATTR).cloned().map(KeyValue::from),
    ))
}

fn parse_optional_condition(
    expression: Option<&String>,
    names: &crate::store::ExprNames,
    values: &crate::store::ExprValues,
) -> Result<Option<Cond>, StoreError> {
    expression
        .map(|expression| parse_condition(expression, names, values))
        .transpose()
}

/// Deterministic shard assignment for parallel scans.
fn shard_of(id: &KeyValue, total_segments: u32) -> u32 {
    let rendered = to_canonical_json(id.inner()).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    rendered.hash(&mut hasher);
    (hasher.finish() % u64::from(total_segments)) as u32
}

impl MemoryStore {
    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut TableData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.lock().expect("store lock poisoned");
        let data = tables.get_mut(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        f(data)
    }

    /// Evaluate one write entry's condition against current state.
    fn check_entry(
        tables: &BTreeMap<String, TableData>,
        entry: &TransactWriteItem,
    ) -> Result<bool, StoreError> {
        let table = entry.table();
        let data = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;

        let (condition, names, values, key) = match entry {
            TransactWriteItem::Put(input) => (
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
                input.item.clone(),
            ),
            TransactWriteItem::Update(input) => (
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
                input.key.clone(),
            ),
            TransactWriteItem::Delete(input) => (
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
                input.key.clone(),
            ),
            TransactWriteItem::ConditionCheck(input) => (
                Some(&input.condition_expression),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
                input.key.clone(),
            ),
        };

        let Some(cond) = parse_optional_condition(condition, names, values)? else {
            return Ok(true);
        };

        let row_key = row_key_of(&key)?;
        Ok(cond.eval(data.rows.get(&row_key)))
    }

    fn apply_entry(
        tables: &mut BTreeMap<String, TableData>,
        entry: &TransactWriteItem,
    ) -> Result<(), StoreError> {
        let table = entry.table();
        let data = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;

        match entry {
            TransactWriteItem::Put(input) => {
                let row_key = row_key_of(&input.item)?;
                data.rows.insert(row_key, input.item.clone());
            }
            TransactWriteItem::Update(input) => {
                let row_key = row_key_of(&input.key)?;
                let mut row = data
                    .rows
                    .get(&row_key)
                    .cloned()
                    .unwrap_or_else(|| input.key.clone());
                let actions = parse_update(
                    &input.update_expression,
                    &input.expression_attribute_names,
                    &input.expression_attribute_values,
                )?;
                apply_update(&actions, &mut row)?;
                data.rows.insert(row_key, row);
            }
            TransactWriteItem::Delete(input) => {
                let row_key = row_key_of(&input.key)?;
                data.rows.remove(&row_key);
            }
            TransactWriteItem::ConditionCheck(_) => {}
        }
        Ok(())
    }

    /// Ordered view of a table or one of its index projections. Each
    /// element is (row payload, primary row key).
    fn view(
        data: &TableData,
        index_name: Option<&str>,
        table: &str,
    ) -> Result<Vec<(Attrs, RowKey)>, StoreError> {
        match index_name {
            None => Ok(data
                .rows
                .iter()
                .map(|(key, row)| (row.clone(), key.clone()))
                .collect()),
            Some(name) => {
                let index = data.indexes.get(name).ok_or_else(|| StoreError::IndexNotFound {
                    table: table.to_string(),
                    index: name.to_string(),
                })?;

                let mut rows: Vec<(Attrs, RowKey)> = Vec::new();
                for (key, row) in &data.rows {
                    // Sparse semantics: rows missing an index key
                    // attribute are invisible to that index.
                    if !row.contains_key(&index.partition_attr) {
                        continue;
                    }
                    if let Some(sort_attr) = &index.sort_attr {
                        if !row.contains_key(sort_attr) {
                            continue;
                        }
                    }
                    rows.push((row.clone(), key.clone()));
                }

                let sort_key = |row: &Attrs, primary: &RowKey| {
                    (
                        row.get(&index.partition_attr).cloned().map(KeyValue::from),
                        index
                            .sort_attr
                            .as_ref()
                            .and_then(|attr| row.get(attr))
                            .cloned()
                            .map(KeyValue::from),
                        primary.clone(),
                    )
                };
                rows.sort_by(|a, b| sort_key(&a.0, &a.1).cmp(&sort_key(&b.0, &b.1)));
                Ok(rows)
            }
        }
    }

    /// Page through an ordered, pre-filtered window of rows.
    fn paginate(
        window: Vec<(Attrs, RowKey)>,
        exclusive_start_key: Option<&Attrs>,
        limit: u32,
        filter: Option<&Cond>,
    ) -> Result<PageOutput, StoreError> {
        let start = match exclusive_start_key {
            None => 0,
            Some(start_key) => {
                let start_row = row_key_of(start_key)?;
                window
                    .iter()
                    .position(|(_, key)| *key == start_row)
                    .map_or(0, |position| position + 1)
            }
        };

        let mut items = Vec::new();
        let mut scanned = 0usize;
        let mut last_scanned: Option<&(Attrs, RowKey)> = None;

        for entry in window.iter().skip(start) {
            if scanned == limit as usize {
                break;
            }
            scanned += 1;
            last_scanned = Some(entry);

            if filter.is_none_or(|cond| cond.eval(Some(&entry.0))) {
                items.push(entry.0.clone());
            }
        }

        let exhausted = start + scanned >= window.len();
        let last_evaluated_key = if exhausted {
            None
        } else {
            last_scanned.map(|(_, key)| {
                let mut attrs = Attrs::new();
                attrs.insert(PARTITION_KEY_ATTR.to_string(), key.0.inner().clone());
                if let Some(sk) = &key.1 {
                    attrs.insert(SORT_KEY_ATTR.to_string(), sk.inner().clone());
                }
                attrs
            })
        };

        Ok(PageOutput {
            items,
            last_evaluated_key,
        })
    }
}

impl Store for MemoryStore {
    fn get(&self, input: GetInput) -> Result<GetOutput, StoreError> {
        self.with_table(&input.table, |data| {
            let row_key = row_key_of(&input.key)?;
            Ok(GetOutput {
                item: data.rows.get(&row_key).cloned(),
            })
        })
    }

    fn transact_get(&self, input: TransactGetInput) -> Result<TransactGetOutput, StoreError> {
        // One lock scope: the responses are a consistent snapshot.
        let tables = self.tables.lock().expect("store lock poisoned");
        let mut responses = Vec::with_capacity(input.gets.len());
        for get in &input.gets {
            let data = tables
                .get(&get.table)
                .ok_or_else(|| StoreError::TableNotFound {
                    table: get.table.clone(),
                })?;
            let row_key = row_key_of(&get.key)?;
            responses.push(data.rows.get(&row_key).cloned());
        }
        Ok(TransactGetOutput { responses })
    }

    fn batch_get(&self, input: BatchGetInput) -> Result<BatchGetOutput, StoreError> {
        let holdback = {
            let mut rounds = self.unprocessed_rounds.lock().expect("store lock poisoned");
            if *rounds > 0 {
                *rounds -= 1;
                true
            } else {
                false
            }
        };

        let tables = self.tables.lock().expect("store lock poisoned");
        let mut output = BatchGetOutput::default();
        let mut served = 0usize;

        for request in &input.requests {
            let data = tables
                .get(&request.table)
                .ok_or_else(|| StoreError::TableNotFound {
                    table: request.table.clone(),
                })?;

            let mut leftover = Vec::new();
            for key in &request.keys {
                if holdback && served >= 1 {
                    leftover.push(key.clone());
                    continue;
                }
                served += 1;
                let row_key = row_key_of(key)?;
                if let Some(row) = data.rows.get(&row_key) {
                    output
                        .responses
                        .entry(request.table.clone())
                        .or_default()
                        .push(row.clone());
                }
            }

            if !leftover.is_empty() {
                output.unprocessed.push(BatchGetRequest {
                    table: request.table.clone(),
                    keys: leftover,
                    consistent_read: request.consistent_read,
                });
            }
        }

        Ok(output)
    }

    fn put(&self, input: PutInput) -> Result<(), StoreError> {
        self.with_table(&input.table, |data| {
            let cond = parse_optional_condition(
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            let row_key = row_key_of(&input.item)?;
            if let Some(cond) = cond {
                if !cond.eval(data.rows.get(&row_key)) {
                    return Err(StoreError::ConditionalCheckFailed {
                        table: input.table.clone(),
                    });
                }
            }
            data.rows.insert(row_key, input.item.clone());
            Ok(())
        })
    }

    fn update(&self, input: UpdateInput) -> Result<(), StoreError> {
        self.with_table(&input.table, |data| {
            let cond = parse_optional_condition(
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            let row_key = row_key_of(&input.key)?;
            if let Some(cond) = cond {
                if !cond.eval(data.rows.get(&row_key)) {
                    return Err(StoreError::ConditionalCheckFailed {
                        table: input.table.clone(),
                    });
                }
            }

            let mut row = data
                .rows
                .get(&row_key)
                .cloned()
                .unwrap_or_else(|| input.key.clone());
            let actions = parse_update(
                &input.update_expression,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            apply_update(&actions, &mut row)?;
            data.rows.insert(row_key, row);
            Ok(())
        })
    }

    fn delete(&self, input: DeleteInput) -> Result<(), StoreError> {
        self.with_table(&input.table, |data| {
            let cond = parse_optional_condition(
                input.condition_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            let row_key = row_key_of(&input.key)?;
            if let Some(cond) = cond {
                if !cond.eval(data.rows.get(&row_key)) {
                    return Err(StoreError::ConditionalCheckFailed {
                        table: input.table.clone(),
                    });
                }
            }
            data.rows.remove(&row_key);
            Ok(())
        })
    }

    fn transact_write(&self, input: TransactWriteInput) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store lock poisoned");

        // Reject duplicate targets, as the real store does.
        let mut targets = Vec::new();
        for entry in &input.items {
            let target = (entry.table().to_string(), row_key_of(&entry.key_attrs())?);
            if targets.contains(&target) {
                return Err(StoreError::Validation {
                    message: "transaction targets the same item twice".to_string(),
                });
            }
            targets.push(target);
        }

        // Phase one: evaluate every condition against current state.
        let mut reasons = Vec::with_capacity(input.items.len());
        let mut any_failed = false;
        for entry in &input.items {
            if Self::check_entry(&tables, entry)? {
                reasons.push(CancellationReason::None);
            } else {
                any_failed = true;
                reasons.push(CancellationReason::ConditionalCheckFailed);
            }
        }

        if any_failed {
            return Err(StoreError::TransactionCanceled { reasons });
        }

        // Phase two: apply all-or-nothing.
        for entry in &input.items {
            Self::apply_entry(&mut tables, entry)?;
        }
        Ok(())
    }

    fn scan(&self, input: ScanInput) -> Result<PageOutput, StoreError> {
        self.with_table(&input.table, |data| {
            let mut window = Self::view(data, input.index_name.as_deref(), &input.table)?;

            if let Some(total_segments) = input.total_segments {
                let segment = input.segment.unwrap_or(0);
                window.retain(|(_, key)| shard_of(&key.0, total_segments) == segment);
            }

            let filter = parse_optional_condition(
                input.filter_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;

            Self::paginate(
                window,
                input.exclusive_start_key.as_ref(),
                input.limit,
                filter.as_ref(),
            )
        })
    }

    fn query(&self, input: QueryInput) -> Result<PageOutput, StoreError> {
        self.with_table(&input.table, |data| {
            let key_condition = parse_condition(
                &input.key_condition_expression,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;

            let mut window: Vec<(Attrs, RowKey)> =
                Self::view(data, input.index_name.as_deref(), &input.table)?
                    .into_iter()
                    .filter(|(row, _)| key_condition.eval(Some(row)))
                    .collect();

            if !input.forward {
                window.reverse();
            }

            let filter = parse_optional_condition(
                input.filter_expression.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;

            Self::paginate(
                window,
                input.exclusive_start_key.as_ref(),
                input.limit,
                filter.as_ref(),
            )
        })
    }
}
