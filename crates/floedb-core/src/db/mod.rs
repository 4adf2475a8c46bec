// Module declarations
pub(crate) mod batch;
pub(crate) mod codec;
pub(crate) mod expr;
pub(crate) mod field;
pub(crate) mod item;
pub(crate) mod iter;
pub(crate) mod key;
pub(crate) mod model;
pub(crate) mod txn;

#[cfg(test)]
mod tests;

// Public re-exports
pub use batch::ModelDiff;
pub use field::ItemSource;
pub use item::ItemHandle;
pub use iter::{Page, Query, QueryOptions, Scan, ScanOptions};
pub use model::{Data, Key, KeyOrData, Model};
pub use txn::{Db, GetOptions, Transaction, TransactionOptions};
