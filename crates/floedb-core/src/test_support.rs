//! Shared fixtures for in-crate tests.

use crate::{
    clock::FixedClock,
    db::Db,
    store::{
        BatchGetInput, BatchGetOutput, DeleteInput, GetInput, GetOutput, PageOutput, PutInput,
        QueryInput, ScanInput, Store, StoreError, TransactGetInput, TransactGetOutput,
        TransactWriteInput, UpdateInput,
        memory::MemoryStore,
    },
};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

/// Epoch anchor for fixed-clock tests.
pub(crate) const TEST_EPOCH: i64 = 1_700_000_000;

///
/// CountingStore
///
/// Store decorator tracking write-path call counts, for asserting that
/// read-only transactions never write.
///

#[derive(Debug)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    writes: AtomicU32,
}

impl CountingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            writes: AtomicU32::new(0),
        }
    }

    pub(crate) fn write_calls(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) const fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

impl Store for CountingStore {
    fn get(&self, input: GetInput) -> Result<GetOutput, StoreError> {
        self.inner.get(input)
    }

    fn transact_get(&self, input: TransactGetInput) -> Result<TransactGetOutput, StoreError> {
        self.inner.transact_get(input)
    }

    fn batch_get(&self, input: BatchGetInput) -> Result<BatchGetOutput, StoreError> {
        self.inner.batch_get(input)
    }

    fn put(&self, input: PutInput) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(input)
    }

    fn update(&self, input: UpdateInput) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(input)
    }

    fn delete(&self, input: DeleteInput) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(input)
    }

    fn transact_write(&self, input: TransactWriteInput) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.transact_write(input)
    }

    fn scan(&self, input: ScanInput) -> Result<PageOutput, StoreError> {
        self.inner.scan(input)
    }

    fn query(&self, input: QueryInput) -> Result<PageOutput, StoreError> {
        self.inner.query(input)
    }
}

///
/// FailingStore
///
/// Store decorator that fails every write with a configurable error,
/// for exercising the retry loop.
///

#[derive(Debug)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
    error: fn() -> StoreError,
    write_attempts: AtomicU32,
}

impl FailingStore {
    pub(crate) fn new(inner: MemoryStore, error: fn() -> StoreError) -> Self {
        Self {
            inner,
            error,
            write_attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> StoreError {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        (self.error)()
    }
}

impl Store for FailingStore {
    fn get(&self, input: GetInput) -> Result<GetOutput, StoreError> {
        self.inner.get(input)
    }

    fn transact_get(&self, input: TransactGetInput) -> Result<TransactGetOutput, StoreError> {
        self.inner.transact_get(input)
    }

    fn batch_get(&self, input: BatchGetInput) -> Result<BatchGetOutput, StoreError> {
        self.inner.batch_get(input)
    }

    fn put(&self, _input: PutInput) -> Result<(), StoreError> {
        Err(self.fail())
    }

    fn update(&self, _input: UpdateInput) -> Result<(), StoreError> {
        Err(self.fail())
    }

    fn delete(&self, _input: DeleteInput) -> Result<(), StoreError> {
        Err(self.fail())
    }

    fn transact_write(&self, _input: TransactWriteInput) -> Result<(), StoreError> {
        Err(self.fail())
    }

    fn scan(&self, input: ScanInput) -> Result<PageOutput, StoreError> {
        self.inner.scan(input)
    }

    fn query(&self, input: QueryInput) -> Result<PageOutput, StoreError> {
        self.inner.query(input)
    }
}

/// Db over a plain memory store and a fixed clock.
pub(crate) fn test_db() -> (Db, Arc<MemoryStore>, Arc<FixedClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(TEST_EPOCH));
    let db = Db::with_clock(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
    );
    (db, store, clock)
}

/// Transaction options tuned for fast tests: immediate-ish backoff.
pub(crate) fn fast_options() -> crate::db::TransactionOptions {
    crate::db::TransactionOptions {
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(200),
        ..Default::default()
    }
}
