//! State store errors.
//!
//! Every table-level failure names the table it happened in, so a log line
//! says whether desired counts or secrets are affected.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// The database file could not be created or is locked by another process.
    #[error("opening state store: {0}")]
    Open(String),

    /// Beginning or committing a redb transaction failed.
    #[error("state store transaction: {0}")]
    Transaction(String),

    /// Opening, reading, or writing `desired_counts` or `secrets` failed.
    #[error("{table} table: {reason}")]
    Table { table: &'static str, reason: String },

    /// A record could not be encoded before it was written.
    #[error("encoding {table} record {key}: {reason}")]
    Encode {
        table: &'static str,
        key: String,
        reason: String,
    },

    /// A stored record no longer decodes as a desired count or a secret.
    #[error("corrupt {table} record {key}: {reason}")]
    Corrupt {
        table: &'static str,
        key: String,
        reason: String,
    },
}

impl StateError {
    pub fn table(&self) -> Option<&'static str> {
        match self {
            Self::Table { table, .. } | Self::Encode { table, .. } | Self::Corrupt { table, .. } => {
                Some(*table)
            }
            Self::Open(_) | Self::Transaction(_) => None,
        }
    }
}
