//! Query and Scan iterators.
//!
//! Both handles collect a per-field filter DSL while "configuring",
//! lock on the first fetch, then paginate through store pages. Query
//! assembles key-condition expressions against the chosen access path
//! (main table or secondary index); Scan pushes every filter down as
//! a lazy filter expression and optionally shards the table for
//! parallel consumption.

use crate::{
    KEY_COMPONENT_SEPARATOR, PARTITION_KEY_ATTR, SORT_KEY_ATTR,
    clock::Clock,
    db::{
        batch::{Tracked, WriteBatcher},
        codec::{decode_token, encode_token},
        expr::ExprBuilder,
        field::ItemSource,
        item::{Item, ItemHandle, is_expired},
        key::{components_numeric, encode_components, encode_piece},
        model::ItemIdent,
    },
    error::Error,
    schema::{FieldRole, ModelSpec},
    store::{Attrs, QueryInput, ScanInput, Store},
    value::{KeyValue, Value},
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::Arc};

/// Page size used by `run` when draining many rows.
const RUN_PAGE_LIMIT: u32 = 50;

///
/// QueryOptions / ScanOptions
///

#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub index: Option<String>,
    pub inconsistent_read: bool,
    pub descending: bool,
    /// Permit filters on non-key fields; they are applied after the
    /// store reads each page and count against its scanned budget.
    pub allow_lazy_filter: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    pub index: Option<String>,
    pub inconsistent_read: bool,
    pub shard_count: Option<u32>,
    pub shard_index: Option<u32>,
}

///
/// FilterOp
///

#[derive(Clone, Debug)]
enum FilterOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    Between(Value, Value),
    Prefix(String),
    Contains(Value),
}

impl FilterOp {
    const fn cmp_operator(&self) -> Option<&'static str> {
        match self {
            Self::Eq(_) => Some("="),
            Self::Ne(_) => Some("<>"),
            Self::Lt(_) => Some("<"),
            Self::Le(_) => Some("<="),
            Self::Gt(_) => Some(">"),
            Self::Ge(_) => Some(">="),
            _ => None,
        }
    }

    fn operand(&self) -> Option<&Value> {
        match self {
            Self::Eq(v) | Self::Ne(v) | Self::Lt(v) | Self::Le(v) | Self::Gt(v) | Self::Ge(v)
            | Self::Contains(v) => Some(v),
            Self::Between(lo, _) => Some(lo),
            Self::Prefix(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
struct FilterClause {
    field: String,
    op: FilterOp,
}

/// Role of a filtered field relative to the access path being read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PathRole {
    Partition,
    Sort,
    Lazy,
}

///
/// AccessPath
///
/// The partition/sort layout of whatever is being read: the main
/// table or one secondary index.
///

struct AccessPath {
    partition_attr: String,
    partition_fields: Vec<String>,
    partition_encoded: bool,
    sort_attr: Option<String>,
    sort_fields: Vec<String>,
    sort_encoded: bool,
}

impl AccessPath {
    fn resolve(spec: &ModelSpec, index: Option<&str>) -> Result<Self, Error> {
        match index {
            None => Ok(Self {
                partition_attr: PARTITION_KEY_ATTR.to_string(),
                partition_fields: spec.key_order().to_vec(),
                partition_encoded: true,
                sort_attr: spec.has_sort_key().then(|| SORT_KEY_ATTR.to_string()),
                sort_fields: spec.sort_key_order().to_vec(),
                sort_encoded: true,
            }),
            Some(name) => {
                let def = spec.index_def(name).ok_or_else(|| Error::InvalidIndex {
                    index: name.to_string(),
                    reason: "index is not declared on this model".to_string(),
                })?;
                Ok(Self {
                    partition_attr: def.partition_attr.clone(),
                    partition_fields: def.key_fields.clone(),
                    partition_encoded: def.partition_materialized,
                    sort_attr: def.sort_attr.clone(),
                    sort_fields: def.sort_fields.clone(),
                    sort_encoded: def.sort_materialized,
                })
            }
        }
    }

    fn role_of(&self, field: &str) -> PathRole {
        if self.partition_fields.iter().any(|name| name == field) {
            PathRole::Partition
        } else if self.sort_fields.iter().any(|name| name == field) {
            PathRole::Sort
        } else {
            PathRole::Lazy
        }
    }
}

///
/// IterBase
///
/// State shared by Query and Scan: target model, batcher handle, the
/// filter set, and the configuring/locked state machine.
///

struct IterBase {
    spec: Arc<ModelSpec>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    batcher: Rc<RefCell<WriteBatcher>>,
    cache_models: bool,
    filters: Vec<FilterClause>,
    locked: bool,
}

impl IterBase {
    fn add_filter(&mut self, field: &str, op: FilterOp) -> Result<(), Error> {
        if self.locked {
            return Err(Error::InvalidFilter(
                "filters are locked after the first fetch".to_string(),
            ));
        }

        let def = self
            .spec
            .field_def(field)
            .ok_or_else(|| Error::InvalidFilter(format!("unknown field '{field}'")))?;

        if let Some(operand) = op.operand() {
            def.schema.validate(field, operand)?;
        }
        if matches!(op, FilterOp::Prefix(_)) && def.schema.kind() != crate::schema::FieldKind::Str {
            return Err(Error::InvalidFilter(format!(
                "prefix requires a string field, '{field}' is {}",
                def.schema.kind().label()
            )));
        }
        if let FilterOp::Between(lo, hi) = &op {
            def.schema.validate(field, hi)?;
            if KeyValue::from(lo.clone()) > KeyValue::from(hi.clone()) {
                return Err(Error::InvalidFilter(
                    "between endpoints must be in ascending order".to_string(),
                ));
            }
        }

        if self
            .filters
            .iter()
            .any(|clause| clause.field == field)
        {
            return Err(Error::InvalidFilter(format!(
                "field '{field}' already has a filter"
            )));
        }

        self.filters.push(FilterClause {
            field: field.to_string(),
            op,
        });
        Ok(())
    }

    /// Turn one store row into a tracked item handle, honoring the
    /// per-transaction model cache. Expired rows read as absent.
    fn materialize(&self, attrs: &Attrs) -> Result<Option<ItemHandle>, Error> {
        let now = self.clock.now_epoch_seconds();
        if is_expired(&self.spec, attrs, now) {
            return Ok(None);
        }

        let ident = ItemIdent::from_attrs(self.spec.table(), attrs)?;

        if self.cache_models {
            let batcher = self.batcher.borrow();
            if let Some(Tracked::Item(handle)) = batcher.find(&ident) {
                let item = handle.borrow();
                if item.is_deleted() {
                    return Err(Error::InvalidCachedModel {
                        table: ident.table.clone(),
                        key: ident.to_string(),
                        reason: "item is marked for deletion".to_string(),
                    });
                }
                if item.source() != ItemSource::Get {
                    return Err(Error::InvalidCachedModel {
                        table: ident.table.clone(),
                        key: ident.to_string(),
                        reason: format!(
                            "item was tracked via '{}', not a read",
                            item.source().label()
                        ),
                    });
                }
                drop(item);
                return Ok(Some(handle.clone()));
            }
        }

        let item = Item::from_store_attrs(&self.spec, ItemSource::Scan, attrs)?;
        let handle = ItemHandle::new(item);
        self.batcher.borrow_mut().track(handle.clone())?;
        Ok(Some(handle))
    }

    /// Render lazy filters into one filter expression.
    fn lazy_filter_expression(
        &self,
        builder: &mut ExprBuilder,
        lazy: &[&FilterClause],
    ) -> Result<Option<String>, Error> {
        let mut clauses = Vec::new();

        for clause in lazy {
            let attr = self.lazy_attr(&clause.field)?;
            let rendered = match &clause.op {
                FilterOp::Between(lo, hi) => {
                    builder.between_clause(&attr, lo.clone(), hi.clone())
                }
                FilterOp::Contains(operand) => {
                    builder.contains_clause(&attr, operand.clone())
                }
                FilterOp::Prefix(_) => {
                    return Err(Error::InvalidFilter(
                        "prefix is only valid on a query's sort key".to_string(),
                    ));
                }
                op => {
                    let operator = op
                        .cmp_operator()
                        .expect("non-range ops always have an operator");
                    let operand = op.operand().expect("comparison ops carry an operand");
                    builder.cmp_clause(&attr, operator, operand.clone())
                }
            };
            clauses.push(rendered);
        }

        Ok(if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        })
    }

    /// Physical attribute for a lazily-filtered field. Key components
    /// are only reachable through their compound projections.
    fn lazy_attr(&self, field: &str) -> Result<String, Error> {
        let def = self
            .spec
            .field_def(field)
            .ok_or_else(|| Error::InvalidFilter(format!("unknown field '{field}'")))?;

        if def.role == FieldRole::Attribute {
            return Ok(field.to_string());
        }
        if self.spec.index_include_keys() {
            return Ok(format!("_c_{field}"));
        }
        Err(Error::InvalidFilter(format!(
            "key component '{field}' cannot be filtered lazily without INDEX_INCLUDE_KEYS"
        )))
    }
}

///
/// Page
///
/// One fetch result: materialized items plus the continuation token.
///

#[derive(Debug)]
pub struct Page {
    pub items: Vec<ItemHandle>,
    pub next_token: Option<String>,
}

///
/// Query
///

pub struct Query {
    base: IterBase,
    options: QueryOptions,
}

impl Query {
    pub(crate) fn new(
        spec: Arc<ModelSpec>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        batcher: Rc<RefCell<WriteBatcher>>,
        cache_models: bool,
        options: QueryOptions,
    ) -> Result<Self, Error> {
        if let Some(index) = &options.index {
            AccessPath::resolve(&spec, Some(index))?;
        }
        Ok(Self {
            base: IterBase {
                spec,
                store,
                clock,
                batcher,
                cache_models,
                filters: Vec::new(),
                locked: false,
            },
            options,
        })
    }

    // ------------------------------------------------------------------
    // Filter DSL
    // ------------------------------------------------------------------

    pub fn eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Eq(value.into()))
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Ne(value.into()))
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Lt(value.into()))
    }

    pub fn le(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Le(value.into()))
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Gt(value.into()))
    }

    pub fn ge(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Ge(value.into()))
    }

    pub fn between(
        &mut self,
        field: &str,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Between(lo.into(), hi.into()))
    }

    pub fn prefix(&mut self, field: &str, prefix: impl Into<String>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Prefix(prefix.into()))
    }

    pub fn contains(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Contains(value.into()))
    }

    fn filter(&mut self, field: &str, op: FilterOp) -> Result<&mut Self, Error> {
        let path = AccessPath::resolve(&self.base.spec, self.options.index.as_deref())?;
        match path.role_of(field) {
            PathRole::Partition => {
                if !matches!(op, FilterOp::Eq(_)) {
                    return Err(Error::InvalidFilter(format!(
                        "partition key field '{field}' only supports =="
                    )));
                }
            }
            PathRole::Sort => {
                if matches!(op, FilterOp::Ne(_) | FilterOp::Contains(_)) {
                    return Err(Error::InvalidFilter(format!(
                        "sort key field '{field}' does not support != or contains"
                    )));
                }
            }
            PathRole::Lazy => {
                if !self.options.allow_lazy_filter {
                    return Err(Error::InvalidFilter(format!(
                        "non-key field '{field}' requires allow_lazy_filter on a query"
                    )));
                }
                if matches!(op, FilterOp::Prefix(_)) {
                    return Err(Error::InvalidFilter(
                        "prefix is only valid on the sort key".to_string(),
                    ));
                }
            }
        }
        self.base.add_filter(field, op)?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Fetch up to `limit` items from the given position.
    pub fn fetch(&mut self, limit: u32, token: Option<&str>) -> Result<Page, Error> {
        self.base.locked = true;
        if limit == 0 {
            return Ok(Page {
                items: Vec::new(),
                next_token: token.map(str::to_string),
            });
        }
        let path = AccessPath::resolve(&self.base.spec, self.options.index.as_deref())?;

        let mut start_key = match token {
            Some(token) => Some(decode_token(token)?),
            None => None,
        };

        let mut items = Vec::new();
        loop {
            let remaining = limit - items.len() as u32;
            let input = self.build_input(&path, remaining, start_key.take())?;
            let page = self.base.store.query(input)?;

            for attrs in &page.items {
                if let Some(handle) = self.base.materialize(attrs)? {
                    items.push(handle);
                }
            }

            match page.last_evaluated_key {
                Some(key) if (items.len() as u32) < limit => start_key = Some(key),
                Some(key) => {
                    return Ok(Page {
                        items,
                        next_token: Some(encode_token(&key)?),
                    });
                }
                None => return Ok(Page { items, next_token: None }),
            }
        }
    }

    /// Drain up to `limit` items, paging internally.
    pub fn run(&mut self, limit: u32) -> Result<Vec<ItemHandle>, Error> {
        run_paged(limit, |page_limit, token| {
            self.fetch(page_limit, token.as_deref())
        })
    }

    fn build_input(
        &self,
        path: &AccessPath,
        limit: u32,
        start_key: Option<Attrs>,
    ) -> Result<QueryInput, Error> {
        let mut builder = ExprBuilder::new();

        let key_condition = self.key_condition(path, &mut builder)?;

        let lazy: Vec<&FilterClause> = self
            .base
            .filters
            .iter()
            .filter(|clause| path.role_of(&clause.field) == PathRole::Lazy)
            .collect();
        let filter_expression = self.base.lazy_filter_expression(&mut builder, &lazy)?;

        let (names, values) = builder.into_attribute_maps();

        Ok(QueryInput {
            table: self.base.spec.table().to_string(),
            index_name: self.options.index.clone(),
            key_condition_expression: key_condition,
            filter_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            consistent_read: !self.options.inconsistent_read && self.options.index.is_none(),
            limit: limit.max(1),
            exclusive_start_key: start_key,
            forward: !self.options.descending,
        })
    }

    /// Assemble the key condition: full partition equality, plus an
    /// optional sort-key clause.
    fn key_condition(&self, path: &AccessPath, builder: &mut ExprBuilder) -> Result<String, Error> {
        // Partition: every component needs an equality.
        let mut partition_vals = BTreeMap::new();
        for field in &path.partition_fields {
            let clause = self
                .base
                .filters
                .iter()
                .find(|clause| &clause.field == field);
            match clause.map(|clause| &clause.op) {
                Some(FilterOp::Eq(value)) => {
                    partition_vals.insert(field.clone(), value.clone());
                }
                _ => {
                    return Err(Error::InvalidFilter(format!(
                        "query requires == on partition key field '{field}'"
                    )));
                }
            }
        }

        let partition_value = if path.partition_encoded {
            let numeric = components_numeric(&self.base.spec, &path.partition_fields)
                || (self.options.index.is_none() && self.base.spec.partition_key_numeric());
            encode_components(&self.base.spec, &path.partition_fields, numeric, &partition_vals)?
                .ok_or_else(|| Error::InvalidFilter("partition key is incomplete".to_string()))?
        } else {
            partition_vals
                .values()
                .next()
                .cloned()
                .ok_or_else(|| Error::InvalidFilter("partition key is incomplete".to_string()))?
        };

        let mut condition = builder.cmp_clause(&path.partition_attr, "=", partition_value);

        if let Some(sort_clause) = self.sort_condition(path, builder)? {
            condition = format!("{condition} AND {sort_clause}");
        }

        Ok(condition)
    }

    /// Sort-key clause from the sort-component filters: a leading run
    /// of equalities, optionally closed by one range/prefix/between on
    /// the next component.
    fn sort_condition(
        &self,
        path: &AccessPath,
        builder: &mut ExprBuilder,
    ) -> Result<Option<String>, Error> {
        let Some(sort_attr) = &path.sort_attr else {
            for clause in &self.base.filters {
                if path.role_of(&clause.field) == PathRole::Sort {
                    return Err(Error::InvalidFilter(
                        "access path has no sort key".to_string(),
                    ));
                }
            }
            return Ok(None);
        };

        let numeric = if self.options.index.is_none() {
            self.base.spec.sort_key_numeric()
        } else {
            path.sort_encoded && components_numeric(&self.base.spec, &path.sort_fields)
        };

        let mut eq_pieces: Vec<String> = Vec::new();
        let mut eq_vals: BTreeMap<String, Value> = BTreeMap::new();
        let mut closing: Option<&FilterClause> = None;
        let mut constrained = 0usize;

        for field in &path.sort_fields {
            let clause = self
                .base
                .filters
                .iter()
                .find(|clause| &clause.field == field && path.role_of(field) == PathRole::Sort);
            let Some(clause) = clause else { break };

            if let FilterOp::Eq(value) = &clause.op {
                eq_pieces.push(encode_piece(field, value)?);
                eq_vals.insert(field.clone(), value.clone());
                constrained += 1;
            } else {
                closing = Some(clause);
                constrained += 1;
                break;
            }
        }

        // Anything past the closing clause cannot be constrained.
        let sort_filter_count = self
            .base
            .filters
            .iter()
            .filter(|clause| path.role_of(&clause.field) == PathRole::Sort)
            .count();
        if sort_filter_count > constrained {
            return Err(Error::InvalidFilter(
                "sort key components must be constrained in order, with at most one range"
                    .to_string(),
            ));
        }

        if constrained == 0 {
            return Ok(None);
        }

        if !path.sort_encoded {
            // Direct single-field sort attribute.
            let field = &path.sort_fields[0];
            return Ok(Some(self.render_direct_sort(
                builder, sort_attr, field, &eq_vals, closing,
            )?));
        }

        if numeric {
            let field = &path.sort_fields[0];
            return Ok(Some(self.render_direct_sort(
                builder, sort_attr, field, &eq_vals, closing,
            )?));
        }

        self.render_encoded_sort(builder, sort_attr, path, &eq_pieces, &eq_vals, closing)
            .map(Some)
    }

    /// Sort clause against a raw (unencoded or numeric) attribute.
    fn render_direct_sort(
        &self,
        builder: &mut ExprBuilder,
        sort_attr: &str,
        field: &str,
        eq_vals: &BTreeMap<String, Value>,
        closing: Option<&FilterClause>,
    ) -> Result<String, Error> {
        if let Some(value) = eq_vals.get(field) {
            return Ok(builder.cmp_clause(sort_attr, "=", value.clone()));
        }

        let clause = closing.expect("constrained sort key has an eq or a closing clause");
        match &clause.op {
            FilterOp::Between(lo, hi) => {
                Ok(builder.between_clause(sort_attr, lo.clone(), hi.clone()))
            }
            FilterOp::Prefix(prefix) => {
                Ok(builder.begins_with_clause(sort_attr, Value::Str(prefix.clone())))
            }
            op => {
                let operator = op.cmp_operator().ok_or_else(|| {
                    Error::InvalidFilter("unsupported sort key operation".to_string())
                })?;
                let operand = op
                    .operand()
                    .ok_or_else(|| Error::InvalidFilter("missing operand".to_string()))?;
                Ok(builder.cmp_clause(sort_attr, operator, operand.clone()))
            }
        }
    }

    /// Sort clause against the NUL-joined encoded attribute.
    fn render_encoded_sort(
        &self,
        builder: &mut ExprBuilder,
        sort_attr: &str,
        path: &AccessPath,
        eq_pieces: &[String],
        eq_vals: &BTreeMap<String, Value>,
        closing: Option<&FilterClause>,
    ) -> Result<String, Error> {
        let sep = KEY_COMPONENT_SEPARATOR.to_string();
        let join = |pieces: &[String]| pieces.join(&sep);

        if closing.is_none() {
            if eq_pieces.len() == path.sort_fields.len() {
                // Full equality on every component.
                let encoded = encode_components(
                    &self.base.spec,
                    &path.sort_fields,
                    false,
                    eq_vals,
                )?
                .ok_or_else(|| Error::InvalidFilter("sort key is incomplete".to_string()))?;
                return Ok(builder.cmp_clause(sort_attr, "=", encoded));
            }
            // Leading components only: everything under that prefix.
            let prefix = format!("{}{sep}", join(eq_pieces));
            return Ok(builder.begins_with_clause(sort_attr, Value::Str(prefix)));
        }

        let clause = closing.expect("checked above");
        let closing_field = &clause.field;

        let with_bound = |bound_piece: String| -> String {
            let mut pieces = eq_pieces.to_vec();
            pieces.push(bound_piece);
            join(&pieces)
        };

        match &clause.op {
            FilterOp::Between(lo, hi) => {
                // Endpoints share the equality prefix, which keeps the
                // range inside it.
                let lo = with_bound(encode_piece(closing_field, lo)?);
                let hi = with_bound(encode_piece(closing_field, hi)?);
                Ok(builder.between_clause(sort_attr, Value::Str(lo), Value::Str(hi)))
            }
            FilterOp::Prefix(prefix) => {
                let mut pieces = eq_pieces.to_vec();
                pieces.push(prefix.clone());
                Ok(builder.begins_with_clause(sort_attr, Value::Str(join(&pieces))))
            }
            op if eq_pieces.is_empty() && path.sort_fields.len() == 1 => {
                let operator = op.cmp_operator().ok_or_else(|| {
                    Error::InvalidFilter("unsupported sort key operation".to_string())
                })?;
                let operand = op
                    .operand()
                    .ok_or_else(|| Error::InvalidFilter("missing operand".to_string()))?;
                let piece = encode_piece(closing_field, operand)?;
                Ok(builder.cmp_clause(sort_attr, operator, Value::Str(piece)))
            }
            _ => Err(Error::InvalidFilter(
                "open-ended comparisons on a compound sort key are not expressible; use \
                 between or prefix"
                    .to_string(),
            )),
        }
    }
}

///
/// Scan
///

pub struct Scan {
    base: IterBase,
    options: ScanOptions,
}

impl Scan {
    pub(crate) fn new(
        spec: Arc<ModelSpec>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        batcher: Rc<RefCell<WriteBatcher>>,
        cache_models: bool,
        options: ScanOptions,
    ) -> Result<Self, Error> {
        if let Some(index) = &options.index {
            AccessPath::resolve(&spec, Some(index))?;
        }
        match (options.shard_count, options.shard_index) {
            (None, None) => {}
            (Some(count), Some(shard)) if shard < count && count > 0 => {}
            _ => {
                return Err(Error::InvalidOptions(
                    "shard_index must be < shard_count, and both must be set together"
                        .to_string(),
                ));
            }
        }
        Ok(Self {
            base: IterBase {
                spec,
                store,
                clock,
                batcher,
                cache_models,
                filters: Vec::new(),
                locked: false,
            },
            options,
        })
    }

    // Scan filters are always lazy; prefix never applies.

    pub fn eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Eq(value.into()))
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Ne(value.into()))
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Lt(value.into()))
    }

    pub fn le(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Le(value.into()))
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Gt(value.into()))
    }

    pub fn ge(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Ge(value.into()))
    }

    pub fn between(
        &mut self,
        field: &str,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Between(lo.into(), hi.into()))
    }

    pub fn contains(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        self.filter(field, FilterOp::Contains(value.into()))
    }

    fn filter(&mut self, field: &str, op: FilterOp) -> Result<&mut Self, Error> {
        // Validate that the field is lazily reachable before recording.
        self.base.lazy_attr(field)?;
        self.base.add_filter(field, op)?;
        Ok(self)
    }

    /// Fetch up to `limit` items from the given position.
    pub fn fetch(&mut self, limit: u32, token: Option<&str>) -> Result<Page, Error> {
        self.base.locked = true;
        if limit == 0 {
            return Ok(Page {
                items: Vec::new(),
                next_token: token.map(str::to_string),
            });
        }

        let mut start_key = match token {
            Some(token) => Some(decode_token(token)?),
            None => None,
        };

        let mut items = Vec::new();
        loop {
            let remaining = limit - items.len() as u32;
            let input = self.build_input(remaining, start_key.take())?;
            let page = self.base.store.scan(input)?;

            for attrs in &page.items {
                if let Some(handle) = self.base.materialize(attrs)? {
                    items.push(handle);
                }
            }

            match page.last_evaluated_key {
                Some(key) if (items.len() as u32) < limit => start_key = Some(key),
                Some(key) => {
                    return Ok(Page {
                        items,
                        next_token: Some(encode_token(&key)?),
                    });
                }
                None => return Ok(Page { items, next_token: None }),
            }
        }
    }

    /// Drain up to `limit` items, paging internally.
    pub fn run(&mut self, limit: u32) -> Result<Vec<ItemHandle>, Error> {
        run_paged(limit, |page_limit, token| {
            self.fetch(page_limit, token.as_deref())
        })
    }

    fn build_input(&self, limit: u32, start_key: Option<Attrs>) -> Result<ScanInput, Error> {
        let mut builder = ExprBuilder::new();
        let lazy: Vec<&FilterClause> = self.base.filters.iter().collect();
        let filter_expression = self.base.lazy_filter_expression(&mut builder, &lazy)?;
        let (names, values) = builder.into_attribute_maps();

        Ok(ScanInput {
            table: self.base.spec.table().to_string(),
            index_name: self.options.index.clone(),
            filter_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            consistent_read: !self.options.inconsistent_read && self.options.index.is_none(),
            limit: limit.max(1),
            exclusive_start_key: start_key,
            segment: self.options.shard_index,
            total_segments: self.options.shard_count,
        })
    }
}

/// Shared run loop: page through fetches of at most `RUN_PAGE_LIMIT`
/// until `limit` items are collected or the cursor is exhausted.
fn run_paged(
    limit: u32,
    mut fetch: impl FnMut(u32, Option<String>) -> Result<Page, Error>,
) -> Result<Vec<ItemHandle>, Error> {
    let mut items = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let remaining = limit - items.len() as u32;
        let page = fetch(remaining.min(RUN_PAGE_LIMIT), token.take())?;
        items.extend(page.items);

        match page.next_token {
            Some(next) if (items.len() as u32) < limit => token = Some(next),
            _ => return Ok(items),
        }
    }
}
