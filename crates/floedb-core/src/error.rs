use crate::store::StoreError;
use thiserror::Error as ThisError;

/// Message thrown when every retry attempt was consumed by retryable
/// failures. External monitoring matches on this exact text.
pub const TOO_MUCH_CONTENTION: &str = "Too much contention.";

///
/// Error
///
/// Public error taxonomy. Validation and usage variants are never
/// retried; concurrency variants (classified condition failures) and
/// retryable store errors drive the transaction retry loop.
///

#[derive(Clone, Debug, ThisError)]
pub enum Error {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid index '{index}': {reason}")]
    InvalidIndex { index: String, reason: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("cached model for {table} {key} is unusable: {reason}")]
    InvalidCachedModel {
        table: String,
        key: String,
        reason: String,
    },

    #[error("tried to create pre-existing item {table} {key}")]
    ModelAlreadyExists { table: String, key: String },

    #[error("tried to delete {table} {key} twice in the same transaction")]
    ModelDeletedTwice { table: String, key: String },

    #[error("tried to track {table} {key} twice in the same transaction")]
    ModelTrackedTwice { table: String, key: String },

    #[error("concurrent update conflict on {table} {key}")]
    InvalidModelUpdate { table: String, key: String },

    #[error("concurrent deletion conflict on {table} {key}")]
    InvalidModelDeletion { table: String, key: String },

    #[error("write attempted in read-only transaction: {0}")]
    WriteAttemptedInReadOnlyTx(String),

    #[error("{message}")]
    TransactionFailed {
        message: String,
        all_errors: Vec<Error>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Classify retryability for the transaction loop (§7 taxonomy:
    /// concurrency + transient retry, everything else is terminal).
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::ModelAlreadyExists { .. }
            | Self::InvalidModelUpdate { .. }
            | Self::InvalidModelDeletion { .. } => true,
            Self::Store(err) => err.retryable(),
            Self::TransactionFailed { all_errors, .. } => {
                !all_errors.is_empty() && all_errors.iter().all(Self::retryable)
            }
            _ => false,
        }
    }

    /// Flatten to the underlying per-entry failures. A plain error is
    /// its own single entry.
    #[must_use]
    pub fn all_errors(&self) -> Vec<Self> {
        match self {
            Self::TransactionFailed { all_errors, .. } if !all_errors.is_empty() => {
                all_errors.clone()
            }
            other => vec![other.clone()],
        }
    }

    /// Wrap per-entry failures: a single error passes through, several
    /// aggregate under one `TransactionFailed`.
    #[must_use]
    pub fn aggregate(mut errors: Vec<Self>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        let message = format!("transaction failed with {} errors", errors.len());
        Self::TransactionFailed {
            message,
            all_errors: errors,
        }
    }
}
