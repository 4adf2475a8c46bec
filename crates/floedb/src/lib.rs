//! FloeDB: a transactional object mapper for conditional-write
//! document stores.
//!
//! Declare models with compound keys and typed fields, then run
//! closures under [`Db::transact`]: reads are tracked for optimistic
//! locking, mutations accumulate per field, and the whole unit of work
//! commits as one atomic store transaction with bounded, jittered
//! retries.
//!
//! This crate is the supported public surface; the runtime lives in
//! `floedb-core`.

pub use floedb_core::{
    clock::{Clock, FixedClock, SystemClock},
    db::{
        Data, Db, GetOptions, ItemHandle, Key, KeyOrData, Model, ModelDiff, Page, Query,
        QueryOptions, Scan, ScanOptions, Transaction, TransactionOptions,
    },
    error::Error,
    schema::{Constraint, FieldKind, FieldSchema, IndexSchema, ModelSchema},
    store::{Store, StoreError, memory::MemoryStore},
    value::{Value, ValueKind},
    vals,
};

///
/// Prelude
///
/// Domain vocabulary only; stores and clocks stay explicit imports.
///

pub mod prelude {
    pub use floedb_core::{
        db::{Db, GetOptions, QueryOptions, ScanOptions, TransactionOptions},
        error::Error,
        schema::{FieldSchema, IndexSchema, ModelSchema},
        value::Value,
        vals,
    };
}
