//! Model module
//!
//! Persistent records owned by the ledger core.

pub mod account;
pub mod admin;
pub mod requests;
pub mod transaction;

pub use account::{Account, AccountStatus, AccountType, LoanMetadata, LockTrack, Track};
pub use admin::AdminUser;
pub use requests::{DeletionRequest, DeletionStatus, LoanRequest, LoanStatus};
pub use transaction::{TransactionRecord, TransactionStatus, TransactionType};

/// A stored enum column held a value no variant matches
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    pub(crate) fn new(kind: &'static str, value: String) -> Self {
        Self { kind, value }
    }
}
