//! Write batcher.
//!
//! Tracks every item a transaction touches, keeps read-only
//! preconditions apart from dirty writes, and collapses the whole set
//! into either one single-item store call or one atomic multi-item
//! transaction at commit. Condition failures are classified here,
//! where the originating item's source is still known.

use crate::{
    db::{
        expr::ExprBuilder,
        field::ItemSource,
        item::{Item, ItemHandle, push_absence_condition},
        model::ItemIdent,
    },
    error::Error,
    schema::ModelSpec,
    store::{
        CancellationReason, ConditionCheckInput, Store, StoreError, TransactWriteInput,
        TransactWriteItem,
    },
};
use std::{collections::BTreeMap, sync::Arc, thread, time::Duration};

/// Seed and attempt bound for the single-item write retry loop.
const SINGLE_WRITE_RETRIES: u32 = 3;
const SINGLE_WRITE_BACKOFF_MS: u64 = 40;

///
/// Tracked
///
/// One tracked row: a real item, or a sentinel standing in for a read
/// miss whose absence must still hold at commit time.
///

#[derive(Debug)]
pub(crate) enum Tracked {
    Item(ItemHandle),
    Absent {
        spec: Arc<ModelSpec>,
        ident: ItemIdent,
    },
}

impl Tracked {
    fn ident(&self) -> ItemIdent {
        match self {
            Self::Item(handle) => handle.borrow().ident().clone(),
            Self::Absent { ident, .. } => ident.clone(),
        }
    }
}

///
/// ModelDiff
///
/// Before/after snapshot of one tracked item, for commit observers.
///

#[derive(Clone, Debug)]
pub struct ModelDiff {
    pub table: String,
    pub before: BTreeMap<String, crate::value::Value>,
    pub after: BTreeMap<String, crate::value::Value>,
}

///
/// WriteBatcher
///

#[derive(Debug, Default)]
pub(crate) struct WriteBatcher {
    entries: Vec<Tracked>,
    index: BTreeMap<ItemIdent, usize>,
    resolved: bool,
}

impl WriteBatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn find(&self, ident: &ItemIdent) -> Option<&Tracked> {
        self.index.get(ident).map(|&slot| &self.entries[slot])
    }

    /// Track a real item. A Get or Create may upgrade an earlier
    /// sentinel for the same row; any other duplicate is a usage
    /// error.
    pub(crate) fn track(&mut self, handle: ItemHandle) -> Result<(), Error> {
        let ident = handle.borrow().ident().clone();
        let source = handle.borrow().source();

        match self.index.get(&ident) {
            None => {
                self.index.insert(ident, self.entries.len());
                self.entries.push(Tracked::Item(handle));
                Ok(())
            }
            Some(&slot) => {
                let upgrade = matches!(self.entries[slot], Tracked::Absent { .. })
                    && matches!(source, ItemSource::Get | ItemSource::Create);
                if upgrade {
                    self.entries[slot] = Tracked::Item(handle);
                    return Ok(());
                }

                let table = ident.table.clone();
                let key = ident.to_string();
                if source == ItemSource::Delete {
                    Err(Error::ModelDeletedTwice { table, key })
                } else {
                    Err(Error::ModelTrackedTwice { table, key })
                }
            }
        }
    }

    /// Track a read miss so its absence is verified at commit.
    /// Idempotent for repeated misses of the same row.
    pub(crate) fn track_absent(
        &mut self,
        spec: &Arc<ModelSpec>,
        ident: ItemIdent,
    ) -> Result<(), Error> {
        match self.index.get(&ident) {
            None => {
                self.index.insert(ident.clone(), self.entries.len());
                self.entries.push(Tracked::Absent {
                    spec: Arc::clone(spec),
                    ident,
                });
                Ok(())
            }
            Some(&slot) => match &self.entries[slot] {
                Tracked::Absent { .. } => Ok(()),
                Tracked::Item(_) => Err(Error::ModelTrackedTwice {
                    table: ident.table.clone(),
                    key: ident.to_string(),
                }),
            },
        }
    }

    /// Mark a tracked item for deletion; double deletion is a usage
    /// error.
    pub(crate) fn mark_deleted(&mut self, ident: &ItemIdent) -> Result<bool, Error> {
        let Some(&slot) = self.index.get(ident) else {
            return Ok(false);
        };
        match &self.entries[slot] {
            Tracked::Item(handle) => {
                if handle.borrow().is_deleted() {
                    return Err(Error::ModelDeletedTwice {
                        table: ident.table.clone(),
                        key: ident.to_string(),
                    });
                }
                handle.borrow_mut().mark_deleted();
                Ok(true)
            }
            Tracked::Absent { .. } => Err(Error::ModelDeletedTwice {
                table: ident.table.clone(),
                key: ident.to_string(),
            }),
        }
    }

    /// Before/after snapshots of every tracked real item.
    pub(crate) fn model_diffs(&self, filter: Option<&dyn Fn(&str) -> bool>) -> Vec<ModelDiff> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Tracked::Item(handle) => {
                    let item = handle.borrow();
                    let table = item.spec().table().to_string();
                    if filter.is_some_and(|keep| !keep(&table)) {
                        return None;
                    }
                    Some(ModelDiff {
                        table,
                        before: item.snapshot_initial(),
                        after: item.snapshot_current(),
                    })
                }
                Tracked::Absent { .. } => None,
            })
            .collect()
    }

    /// Collapse the tracked set into store writes. Returns false when
    /// the transaction turned out to be a pure read.
    pub(crate) fn commit(
        &mut self,
        store: &dyn Store,
        now_epoch: i64,
        expect_writes: bool,
    ) -> Result<bool, Error> {
        if self.resolved {
            return Err(Error::InvalidParameter {
                name: "commit".to_string(),
                reason: "transaction already committed".to_string(),
            });
        }
        self.resolved = true;

        // (write entry, slot of the originating tracked entry)
        let mut writes: Vec<(TransactWriteItem, usize)> = Vec::new();
        let mut read_only_slots: Vec<usize> = Vec::new();

        for (slot, entry) in self.entries.iter().enumerate() {
            match entry {
                Tracked::Item(handle) => {
                    let item = handle.borrow();
                    if item.is_dirty() {
                        item.finalize()?;
                        writes.push((write_entry(&item, now_epoch)?, slot));
                    } else {
                        read_only_slots.push(slot);
                    }
                }
                Tracked::Absent { .. } => read_only_slots.push(slot),
            }
        }

        if writes.is_empty() {
            tracing::debug!("commit is a no-op: no dirty items");
            return Ok(false);
        }

        if !expect_writes {
            let ident = self.entries[writes[0].1].ident();
            return Err(Error::WriteAttemptedInReadOnlyTx(ident.to_string()));
        }

        if writes.len() == 1 && self.entries.len() == 1 {
            let (entry, slot) = writes.remove(0);
            return self.single_write(store, entry, slot).map(|()| true);
        }

        let mut items = Vec::with_capacity(writes.len() + read_only_slots.len());
        for (entry, _) in writes {
            items.push(entry);
        }
        for slot in read_only_slots {
            if let Some(check) = self.condition_check(slot, now_epoch) {
                items.push(TransactWriteItem::ConditionCheck(check));
            }
        }

        tracing::debug!(entries = items.len(), "submitting atomic transaction");
        match store.transact_write(TransactWriteInput {
            items: items.clone(),
        }) {
            Ok(()) => Ok(true),
            Err(StoreError::TransactionCanceled { reasons }) => {
                Err(self.classify_cancellation(&items, &reasons))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn condition_check(&self, slot: usize, now_epoch: i64) -> Option<ConditionCheckInput> {
        match &self.entries[slot] {
            Tracked::Item(handle) => handle.borrow().condition_check_params(),
            Tracked::Absent { spec, ident } => {
                let mut builder = ExprBuilder::new();
                push_absence_condition(spec, &mut builder, now_epoch);
                let condition_expression = builder.condition_expression()?;
                let (names, values) = builder.into_attribute_maps();
                Some(ConditionCheckInput {
                    table: ident.table.clone(),
                    key: ident.key_attrs(),
                    condition_expression,
                    expression_attribute_names: names,
                    expression_attribute_values: values,
                })
            }
        }
    }

    /// Cheaper path for a one-item transaction, with its own bounded
    /// retry loop for transient store failures.
    fn single_write(
        &self,
        store: &dyn Store,
        entry: TransactWriteItem,
        slot: usize,
    ) -> Result<(), Error> {
        let mut backoff = Duration::from_millis(SINGLE_WRITE_BACKOFF_MS);

        for attempt in 0..SINGLE_WRITE_RETRIES {
            let result = match entry.clone() {
                TransactWriteItem::Put(input) => store.put(input),
                TransactWriteItem::Update(input) => store.update(input),
                TransactWriteItem::Delete(input) => store.delete(input),
                TransactWriteItem::ConditionCheck(_) => unreachable!("checks are never writes"),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(StoreError::ConditionalCheckFailed { .. }) => {
                    return Err(self.classify_slot(slot));
                }
                Err(err) if err.retryable() && attempt + 1 < SINGLE_WRITE_RETRIES => {
                    tracing::debug!(attempt, "single-item write retrying after transient error");
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(err) => return Err(err.into()),
            }
        }

        unreachable!("retry loop returns on its final attempt")
    }

    /// Map per-entry cancellation reasons back to tracked items and
    /// classify each condition failure by its source.
    fn classify_cancellation(
        &self,
        items: &[TransactWriteItem],
        reasons: &[CancellationReason],
    ) -> Error {
        let mut errors = Vec::new();

        for (position, reason) in reasons.iter().enumerate() {
            if *reason != CancellationReason::ConditionalCheckFailed {
                continue;
            }
            let Some(item) = items.get(position) else {
                continue;
            };
            let failed = ItemIdent::from_attrs(item.table(), &item.key_attrs());
            let Ok(failed) = failed else { continue };
            if let Some(&slot) = self.index.get(&failed) {
                errors.push(self.classify_slot(slot));
            }
        }

        if errors.is_empty() {
            // No condition failure to classify: surface the original
            // cancellation (still retryable).
            return StoreError::TransactionCanceled {
                reasons: reasons.to_vec(),
            }
            .into();
        }

        Error::aggregate(errors)
    }

    fn classify_slot(&self, slot: usize) -> Error {
        let entry = &self.entries[slot];
        let ident = entry.ident();
        let table = ident.table.clone();
        let key = ident.to_string();

        match entry {
            Tracked::Item(handle) => {
                let item = handle.borrow();
                if item.is_deleted() {
                    Error::InvalidModelDeletion { table, key }
                } else if item.source() == ItemSource::Create {
                    Error::ModelAlreadyExists { table, key }
                } else {
                    Error::InvalidModelUpdate { table, key }
                }
            }
            Tracked::Absent { .. } => Error::InvalidModelUpdate { table, key },
        }
    }
}

/// Produce the write entry for one dirty item, honoring the put vs
/// update policy.
fn write_entry(item: &Item, now_epoch: i64) -> Result<TransactWriteItem, Error> {
    if item.is_deleted() {
        return Ok(TransactWriteItem::Delete(item.delete_params()?));
    }
    if item.source() == ItemSource::CreateOrPut {
        return Ok(TransactWriteItem::Put(item.put_params(now_epoch)?));
    }
    item.update_params(now_epoch)?
        .ok_or_else(|| Error::InvalidParameter {
            name: "commit".to_string(),
            reason: "dirty item produced no write entry".to_string(),
        })
}
