//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::model::Track;

/// Broad error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    InsufficientFunds,
    InsufficientBalanceForRollback,
    State,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Authorization => "authorization_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InsufficientBalanceForRollback => "insufficient_balance_for_rollback",
            ErrorKind::State => "state_error",
        }
    }
}

/// Business rule violations and domain invariant failures.
///
/// Every variant is recoverable at the core boundary and leaves state
/// untouched, except `InvalidCredential` whose lockout side effect has
/// already been persisted when it is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ---- Validation ----
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {requested} is below the minimum of {minimum}")]
    BelowMinimum { minimum: Decimal, requested: Decimal },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    #[error("IFSC code does not match the recipient account")]
    IfscMismatch,

    // ---- Authorization ----
    #[error("Invalid credential ({remaining_attempts} attempts remaining)")]
    InvalidCredential { remaining_attempts: u32 },

    #[error("{0} is locked")]
    TrackLocked(Track),

    #[error("Session is not bound to account {0}")]
    SessionMismatch(String),

    #[error("Administrator role required")]
    AdminRequired,

    #[error("Only internal callers may perform this operation")]
    InternalCallerRequired,

    #[error("Only the default administrator may perform this operation")]
    DefaultAdminRequired,

    #[error("Verification details do not match our records")]
    IdentityMismatch,

    #[error("Invalid or expired one-time code")]
    InvalidOtp,

    // ---- Not found ----
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Loan request not found: {0}")]
    LoanRequestNotFound(Uuid),

    #[error("Deletion request not found: {0}")]
    DeletionRequestNotFound(Uuid),

    #[error("Admin not found: {0}")]
    AdminNotFound(String),

    // ---- Conflict ----
    #[error("Duplicate request ignored")]
    DuplicateRequest,

    #[error("Transaction {0} is already reversed")]
    AlreadyReversed(String),

    #[error("Government ID is already registered")]
    DuplicateGovernmentId,

    #[error("Deletion already requested for account {0}")]
    DeletionAlreadyRequested(String),

    #[error("A loan request is already pending for account {0}")]
    PendingLoanExists(String),

    // ---- Funds ----
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Insufficient balance on {account} to reverse: required {required}, available {available}")]
    InsufficientBalanceForRollback {
        account: String,
        required: Decimal,
        available: Decimal,
    },

    // ---- State ----
    #[error("Illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Account {0} is deleted")]
    AccountDeleted(String),

    #[error("Account {0} has an active loan")]
    ActiveLoan(String),

    #[error("Account {0} has no active loan")]
    NoActiveLoan(String),

    #[error("Admin {0} is protected and cannot be deleted")]
    ProtectedAdmin(String),

    #[error("Admins cannot delete their own login")]
    SelfDeletion,
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds { required, available }
    }

    /// Create a field validation error
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Create an illegal state transition error
    pub fn illegal_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Classify this error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::BelowMinimum { .. }
            | Self::InvalidField { .. }
            | Self::SameAccountTransfer
            | Self::IfscMismatch => ErrorKind::Validation,

            Self::InvalidCredential { .. }
            | Self::TrackLocked(_)
            | Self::SessionMismatch(_)
            | Self::AdminRequired
            | Self::InternalCallerRequired
            | Self::DefaultAdminRequired
            | Self::IdentityMismatch
            | Self::InvalidOtp => ErrorKind::Authorization,

            Self::AccountNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::LoanRequestNotFound(_)
            | Self::DeletionRequestNotFound(_)
            | Self::AdminNotFound(_) => ErrorKind::NotFound,

            Self::DuplicateRequest
            | Self::AlreadyReversed(_)
            | Self::DuplicateGovernmentId
            | Self::DeletionAlreadyRequested(_)
            | Self::PendingLoanExists(_) => ErrorKind::Conflict,

            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientBalanceForRollback { .. } => ErrorKind::InsufficientBalanceForRollback,

            Self::IllegalTransition { .. }
            | Self::AccountDeleted(_)
            | Self::ActiveLoan(_)
            | Self::NoActiveLoan(_)
            | Self::ProtectedAdmin(_)
            | Self::SelfDeletion => ErrorKind::State,
        }
    }

    /// Check if this is an authorization failure
    pub fn is_authorization_error(&self) -> bool {
        self.kind() == ErrorKind::Authorization
    }

    /// Check if this is a conflict error (duplicate or already applied)
    pub fn is_conflict_error(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<crate::domain::AmountError> for DomainError {
    fn from(err: crate::domain::AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}
