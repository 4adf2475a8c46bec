use std::fmt;
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Failures surfaced by a store implementation. Retryability is a
/// property of the variant: contention and transient variants are
/// retried by the transaction loop, everything else is permanent.
///

#[derive(Clone, Debug, ThisError)]
pub enum StoreError {
    /// A single-item conditional write found the condition false.
    #[error("conditional check failed on table '{table}'")]
    ConditionalCheckFailed { table: String },

    /// An atomic multi-item write was canceled; one reason per entry,
    /// in submission order.
    #[error("transaction canceled: [{}]", format_reasons(.reasons))]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    /// Store-tagged transient failure (throttling, capacity, partial
    /// outage). Always retryable.
    #[error("store transient failure: {message}")]
    Transient { message: String },

    #[error("table not found: '{table}'")]
    TableNotFound { table: String },

    #[error("index not found: '{index}' on table '{table}'")]
    IndexNotFound { table: String, index: String },

    /// The store rejected an expression or parameter shape.
    #[error("store validation failure: {message}")]
    Validation { message: String },
}

impl StoreError {
    /// True when the transaction loop may retry the attempt.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ConditionalCheckFailed { .. }
                | Self::TransactionCanceled { .. }
                | Self::Transient { .. }
        )
    }
}

fn format_reasons(reasons: &[CancellationReason]) -> String {
    let labels: Vec<&str> = reasons.iter().map(CancellationReason::label).collect();
    labels.join(", ")
}

///
/// CancellationReason
///
/// Per-entry outcome of a canceled atomic write. `None` marks entries
/// that did not themselves fail.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed,
    TransactionConflict,
}

impl CancellationReason {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::ConditionalCheckFailed => "ConditionalCheckFailed",
            Self::TransactionConflict => "TransactionConflict",
        }
    }
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
