//! Transactions.
//!
//! `Db` owns the store handle, the clock, and the model registry. A
//! `Transaction` is the user-facing unit of work: reads track items
//! for optimistic locking, mutations record field history, and the
//! run loop commits atomically with bounded retries and jittered
//! exponential backoff.

use crate::{
    clock::{Clock, SystemClock},
    db::{
        batch::{ModelDiff, Tracked, WriteBatcher},
        field::ItemSource,
        item::{Item, ItemHandle, is_expired},
        iter::{Query, QueryOptions, Scan, ScanOptions},
        model::{ItemIdent, KeyOrData, Model},
    },
    error::{Error, TOO_MUCH_CONTENTION},
    schema::{FieldRole, ModelSchema, ModelSpec},
    store::{BatchGetInput, BatchGetRequest, GetInput, Store, TransactGetInput},
    value::Value,
};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::{Arc, RwLock},
    thread,
    time::Duration,
};

/// Bound on batched-read retry rounds for unprocessed keys.
const BATCH_GET_MAX_ROUNDS: u32 = 11;
const BATCH_GET_BACKOFF_SEED_MS: u64 = 40;
const BATCH_GET_BACKOFF_CAP: Duration = Duration::from_secs(1);

///
/// TransactionOptions
///

#[derive(Clone, Debug)]
pub struct TransactionOptions {
    pub read_only: bool,
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub cache_models: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            cache_models: false,
        }
    }
}

impl TransactionOptions {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.initial_backoff < Duration::from_millis(1) {
            return Err(Error::InvalidOptions(
                "initialBackoff must be at least 1ms".to_string(),
            ));
        }
        // The atomic write itself costs on the order of 100-200ms, so a
        // smaller cap would only burn retries.
        if self.max_backoff < Duration::from_millis(200) {
            return Err(Error::InvalidOptions(
                "maxBackoff must be at least 200ms".to_string(),
            ));
        }
        Ok(())
    }
}

///
/// GetOptions
///

#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    /// Use an eventually-consistent read for single gets, or the
    /// batched (non-transactional) path for multi-gets.
    pub inconsistent_read: bool,
    /// Materialize a new item (defaults applied) when the row is
    /// absent. Requires a `Data` handle.
    pub create_if_missing: bool,
}

///
/// Db
///

pub struct Db {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    registry: RwLock<HashMap<String, Arc<ModelSpec>>>,
}

impl Db {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Compile a model schema, or return the cached compilation. A
    /// table may only ever be registered with one schema.
    pub fn model(&self, schema: ModelSchema) -> Result<Model, Error> {
        let table = schema.table().to_string();

        {
            let registry = self.registry.read().expect("model registry poisoned");
            if let Some(spec) = registry.get(&table) {
                if spec.declared() == &schema {
                    return Ok(Model::new(Arc::clone(spec)));
                }
                return Err(Error::InvalidParameter {
                    name: table,
                    reason: "table already registered with a different schema".to_string(),
                });
            }
        }

        let spec = Arc::new(ModelSpec::compile(schema)?);
        let mut registry = self.registry.write().expect("model registry poisoned");
        let spec = registry.entry(table).or_insert_with(|| Arc::clone(&spec));
        Ok(Model::new(Arc::clone(spec)))
    }

    /// Run a closure under a transaction with default options.
    pub fn transact<T>(
        &self,
        f: impl FnMut(&mut Transaction<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.transact_with(TransactionOptions::default(), f)
    }

    /// Run a closure under a transaction. The closure may run up to
    /// `retries + 1` times; only fully retryable failures re-enter it.
    pub fn transact_with<T>(
        &self,
        options: TransactionOptions,
        mut f: impl FnMut(&mut Transaction<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        options.validate()?;

        let mut backoff = options.initial_backoff;
        let mut rng = SmallRng::from_entropy();

        for attempt in 0..=options.retries {
            // Fresh batcher and event emitter each attempt.
            let mut tx = Transaction::new(self, options.clone());

            let result = f(&mut tx).and_then(|value| tx.commit().map(|()| value));
            match result {
                Ok(value) => {
                    tx.emit_post_commit();
                    return Ok(value);
                }
                Err(err) if !err.retryable() => {
                    tx.emit_tx_failed(&err);
                    return Err(err);
                }
                Err(err) => {
                    if attempt == options.retries {
                        let failure = Error::TransactionFailed {
                            message: TOO_MUCH_CONTENTION.to_string(),
                            all_errors: err.all_errors(),
                        };
                        tx.emit_tx_failed(&failure);
                        return Err(failure);
                    }

                    let jitter = rng.gen_range(0.9..=1.1);
                    let sleep = backoff.mul_f64(jitter);
                    tracing::debug!(
                        attempt,
                        backoff_ms = sleep.as_millis() as u64,
                        error = %err,
                        "transaction attempt failed; backing off"
                    );
                    thread::sleep(sleep);
                    backoff = (backoff * 2).min(options.max_backoff);
                }
            }
        }

        unreachable!("run loop always returns from its final attempt")
    }
}

///
/// Transaction
///

pub struct Transaction<'db> {
    db: &'db Db,
    options: TransactionOptions,
    batcher: Rc<RefCell<WriteBatcher>>,
    post_commit: Vec<Box<dyn FnMut()>>,
    tx_failed: Vec<Box<dyn FnMut(&Error)>>,
}

impl<'db> Transaction<'db> {
    fn new(db: &'db Db, options: TransactionOptions) -> Self {
        Self {
            db,
            options,
            batcher: Rc::new(RefCell::new(WriteBatcher::new())),
            post_commit: Vec::new(),
            tx_failed: Vec::new(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub(crate) fn batcher(&self) -> Rc<RefCell<WriteBatcher>> {
        Rc::clone(&self.batcher)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Run after a successful commit, in registration order.
    pub fn on_post_commit(&mut self, handler: impl FnMut() + 'static) {
        self.post_commit.push(Box::new(handler));
    }

    /// Run exactly once when the transaction fails terminally.
    pub fn on_tx_failed(&mut self, handler: impl FnMut(&Error) + 'static) {
        self.tx_failed.push(Box::new(handler));
    }

    fn emit_post_commit(&mut self) {
        for handler in &mut self.post_commit {
            handler();
        }
    }

    fn emit_tx_failed(&mut self, err: &Error) {
        for handler in &mut self.tx_failed {
            handler(err);
        }
    }

    fn commit(&mut self) -> Result<(), Error> {
        let now = self.db.clock.now_epoch_seconds();
        self.batcher
            .borrow_mut()
            .commit(self.db.store.as_ref(), now, !self.options.read_only)
            .map(|_| ())
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Track a brand-new item; commit fails if the row already exists.
    pub fn create(
        &mut self,
        model: &Model,
        vals: impl Into<BTreeMap<String, Value>>,
    ) -> Result<ItemHandle, Error> {
        let item = Item::from_vals(model.spec(), ItemSource::Create, &vals.into())?;
        let handle = ItemHandle::new(item);
        self.batcher.borrow_mut().track(handle.clone())?;
        Ok(handle)
    }

    /// Construct an update whose optimistic-lock baseline is
    /// `original` and whose new values are `updated`. Every original
    /// field is conditioned; key components may not be updated.
    pub fn update(
        &mut self,
        model: &Model,
        original: impl Into<BTreeMap<String, Value>>,
        updated: impl Into<BTreeMap<String, Value>>,
    ) -> Result<ItemHandle, Error> {
        let original = original.into();
        let updated = updated.into();

        let item = Item::from_vals(model.spec(), ItemSource::Update, &original)?;
        let handle = ItemHandle::new(item);

        {
            let mut item = handle.borrow_mut();
            for (name, value) in &original {
                let def = model.spec().field_def(name).ok_or_else(|| {
                    Error::InvalidParameter {
                        name: name.clone(),
                        reason: "unknown field".to_string(),
                    }
                })?;
                if def.role == FieldRole::Attribute {
                    item.assume_initial(name, Some(value.clone()))?;
                }
            }
        }

        for (name, value) in updated {
            let def = model
                .spec()
                .field_def(&name)
                .ok_or_else(|| Error::InvalidParameter {
                    name: name.clone(),
                    reason: "unknown field".to_string(),
                })?;
            if def.role.is_key() {
                return Err(Error::InvalidParameter {
                    name,
                    reason: "key components may not be updated".to_string(),
                });
            }
            handle.set(&name, value)?;
        }

        self.batcher.borrow_mut().track(handle.clone())?;
        Ok(handle)
    }

    /// Overwrite-or-create: `updated` must be a complete item;
    /// `original` values become read baselines, so the write succeeds
    /// only if the row is absent or still matches them.
    pub fn create_or_put(
        &mut self,
        model: &Model,
        original: impl Into<BTreeMap<String, Value>>,
        updated: impl Into<BTreeMap<String, Value>>,
    ) -> Result<ItemHandle, Error> {
        let original = original.into();
        let updated = updated.into();

        let item = Item::from_vals(model.spec(), ItemSource::CreateOrPut, &updated)?;
        let handle = ItemHandle::new(item);

        {
            let mut item = handle.borrow_mut();
            for (name, value) in &original {
                let def = model.spec().field_def(name).ok_or_else(|| {
                    Error::InvalidParameter {
                        name: name.clone(),
                        reason: "unknown field".to_string(),
                    }
                })?;
                if def.role.is_key() {
                    if updated.get(name) != Some(value) {
                        return Err(Error::InvalidParameter {
                            name: name.clone(),
                            reason: "original key components must match updated values"
                                .to_string(),
                        });
                    }
                    continue;
                }
                item.assume_initial(name, Some(value.clone()))?;
            }
        }

        self.batcher.borrow_mut().track(handle.clone())?;
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read one row. Returns `None` for a miss (the absence is then
    /// verified at commit), or a new-item handle under
    /// `create_if_missing`.
    pub fn get(
        &mut self,
        target: impl Into<KeyOrData>,
        options: &GetOptions,
    ) -> Result<Option<ItemHandle>, Error> {
        let target = target.into();

        if let Some(cached) = self.cached_handle(&target)? {
            return Ok(Some(cached));
        }

        let output = self.db.store.get(GetInput {
            table: target.ident().table.clone(),
            key: target.key_attrs(),
            consistent_read: !options.inconsistent_read,
        })?;

        self.resolve_read(&target, output.item.as_ref(), options)
    }

    /// Read many rows. Consistent reads use one atomic multi-get;
    /// inconsistent reads batch, retrying unprocessed keys.
    pub fn get_many(
        &mut self,
        targets: Vec<KeyOrData>,
        options: &GetOptions,
    ) -> Result<Vec<Option<ItemHandle>>, Error> {
        let mut results: Vec<Option<ItemHandle>> = vec![None; targets.len()];
        let mut fetch: Vec<usize> = Vec::new();

        for (position, target) in targets.iter().enumerate() {
            match self.cached_handle(target)? {
                Some(handle) => results[position] = Some(handle),
                None => fetch.push(position),
            }
        }

        if fetch.is_empty() {
            return Ok(results);
        }

        let fetched = if options.inconsistent_read {
            self.batch_get(&targets, &fetch)?
        } else {
            let gets = fetch
                .iter()
                .map(|&position| GetInput {
                    table: targets[position].ident().table.clone(),
                    key: targets[position].key_attrs(),
                    consistent_read: true,
                })
                .collect();
            self.db
                .store
                .transact_get(TransactGetInput { gets })?
                .responses
        };

        for (&position, attrs) in fetch.iter().zip(fetched) {
            results[position] = self.resolve_read(&targets[position], attrs.as_ref(), options)?;
        }

        Ok(results)
    }

    /// Batched read with bounded unprocessed-key retries.
    fn batch_get(
        &self,
        targets: &[KeyOrData],
        fetch: &[usize],
    ) -> Result<Vec<Option<crate::store::Attrs>>, Error> {
        let mut pending: Vec<BatchGetRequest> = fetch
            .iter()
            .map(|&position| BatchGetRequest {
                table: targets[position].ident().table.clone(),
                keys: vec![targets[position].key_attrs()],
                consistent_read: false,
            })
            .collect();

        let mut found: BTreeMap<ItemIdent, crate::store::Attrs> = BTreeMap::new();
        let mut backoff = Duration::from_millis(BATCH_GET_BACKOFF_SEED_MS);

        for round in 0..BATCH_GET_MAX_ROUNDS {
            let output = self.db.store.batch_get(BatchGetInput {
                requests: pending.clone(),
            })?;

            for (table, items) in output.responses {
                for attrs in items {
                    let ident = ItemIdent::from_attrs(&table, &attrs)?;
                    found.insert(ident, attrs);
                }
            }

            if output.unprocessed.is_empty() {
                pending.clear();
                break;
            }

            tracing::debug!(round, "batched read left keys unprocessed; retrying");
            pending = output.unprocessed;
            thread::sleep(backoff);
            backoff = (backoff * 2).min(BATCH_GET_BACKOFF_CAP);
        }

        if !pending.is_empty() {
            return Err(Error::Store(crate::store::StoreError::Transient {
                message: "batched read did not drain unprocessed keys".to_string(),
            }));
        }

        Ok(fetch
            .iter()
            .map(|&position| found.get(targets[position].ident()).cloned())
            .collect())
    }

    /// Shared miss/hit handling for every read path.
    fn resolve_read(
        &mut self,
        target: &KeyOrData,
        attrs: Option<&crate::store::Attrs>,
        options: &GetOptions,
    ) -> Result<Option<ItemHandle>, Error> {
        let spec = target.spec();
        let now = self.db.clock.now_epoch_seconds();

        let live = attrs.filter(|attrs| !is_expired(spec, attrs, now));

        if let Some(attrs) = live {
            let item = Item::from_store_attrs(spec, ItemSource::Get, attrs)?;
            let handle = ItemHandle::new(item);
            self.batcher.borrow_mut().track(handle.clone())?;
            return Ok(Some(handle));
        }

        if options.create_if_missing {
            let KeyOrData::Data(data) = target else {
                return Err(Error::InvalidParameter {
                    name: "create_if_missing".to_string(),
                    reason: "requires a Data handle carrying non-key values".to_string(),
                });
            };
            let item = Item::from_vals(&data.spec, ItemSource::Get, &data.vals)?;
            let handle = ItemHandle::new(item);
            self.batcher.borrow_mut().track(handle.clone())?;
            return Ok(Some(handle));
        }

        self.batcher
            .borrow_mut()
            .track_absent(spec, target.ident().clone())?;
        Ok(None)
    }

    /// Model-cache lookup; only meaningful under `cache_models`.
    fn cached_handle(&self, target: &KeyOrData) -> Result<Option<ItemHandle>, Error> {
        if !self.options.cache_models {
            return Ok(None);
        }

        let batcher = self.batcher.borrow();
        match batcher.find(target.ident()) {
            Some(Tracked::Item(handle)) => {
                let item = handle.borrow();
                if item.is_deleted() {
                    return Err(Error::InvalidCachedModel {
                        table: target.ident().table.clone(),
                        key: target.ident().to_string(),
                        reason: "item is marked for deletion".to_string(),
                    });
                }
                if item.source() != ItemSource::Get {
                    return Err(Error::InvalidCachedModel {
                        table: target.ident().table.clone(),
                        key: target.ident().to_string(),
                        reason: format!(
                            "item was tracked via '{}', not a read",
                            item.source().label()
                        ),
                    });
                }
                drop(item);
                Ok(Some(handle.clone()))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete by key. If the row is already tracked, the tracked item
    /// is marked; otherwise a delete-source item is created.
    pub fn delete(&mut self, target: impl Into<KeyOrData>) -> Result<(), Error> {
        let target = target.into();

        if self.batcher.borrow_mut().mark_deleted(target.ident())? {
            return Ok(());
        }

        let vals = match &target {
            KeyOrData::Key(key) => key.key_vals(),
            KeyOrData::Data(data) => data.to_key().key_vals(),
        };
        let item = Item::from_vals(target.spec(), ItemSource::Delete, &vals)?;
        let handle = ItemHandle::new(item);
        self.batcher.borrow_mut().track(handle)?;
        Ok(())
    }

    /// Delete an item handle returned by a read or create.
    pub fn delete_item(&mut self, handle: &ItemHandle) -> Result<(), Error> {
        let ident = handle.borrow().ident().clone();
        if self.batcher.borrow_mut().mark_deleted(&ident)? {
            return Ok(());
        }
        Err(Error::InvalidParameter {
            name: "delete".to_string(),
            reason: "item is not tracked by this transaction".to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Iterators
    // ------------------------------------------------------------------

    /// Query handle over the model's main table or one of its indexes.
    pub fn query(&self, model: &Model, options: QueryOptions) -> Result<Query, Error> {
        Query::new(
            Arc::clone(model.spec()),
            Arc::clone(&self.db.store),
            Arc::clone(&self.db.clock),
            self.batcher(),
            self.options.cache_models,
            options,
        )
    }

    /// Scan handle, optionally sharded for parallel consumption.
    pub fn scan(&self, model: &Model, options: ScanOptions) -> Result<Scan, Error> {
        Scan::new(
            Arc::clone(model.spec()),
            Arc::clone(&self.db.store),
            Arc::clone(&self.db.clock),
            self.batcher(),
            self.options.cache_models,
            options,
        )
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Before/after snapshots of tracked items, optionally filtered by
    /// table name.
    #[must_use]
    pub fn model_diffs(&self, filter: Option<&dyn Fn(&str) -> bool>) -> Vec<ModelDiff> {
        self.batcher.borrow().model_diffs(filter)
    }
}
