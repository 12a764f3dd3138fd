//! Persistence port
//!
//! `LedgerStore` is the only way handlers touch persisted state. Reads are
//! plain lookups; every write of one logical operation is a `WriteBatch`
//! that commits all-or-nothing. Balance changes exist only as conditional
//! `Debit`/`Credit` ops, never as a whole-row overwrite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Amount;
use crate::model::{
    Account, AdminUser, DeletionRequest, DeletionStatus, LoanRequest, LoanStatus, TransactionRecord,
    TransactionStatus, TransactionType,
};

mod locks;
mod memory;
mod postgres;

pub use locks::{AccountGuard, AccountLocks};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

// =========================================================================
// Errors
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Insufficient balance on account {0}")]
    InsufficientBalance(String),

    #[error("Credit would take account {0} past the balance ceiling")]
    BalanceLimit(String),

    #[error("Transaction {0} is not in SUCCESS state")]
    AlreadyReversed(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate {0}")]
    Duplicate(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Infrastructure failure, as opposed to a failed write condition
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Corrupt(_))
    }
}

// =========================================================================
// Write batch
// =========================================================================

/// One write inside a batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// New account; account number and government ID must be unused
    InsertAccount(Account),
    /// Overwrite every column except the balance
    UpdateAccount(Account),
    DeleteAccount(String),
    /// Subtract from balance, only if balance >= amount
    Debit { account: String, amount: Amount },
    /// Add to balance, only if the result stays within `Balance::MAX`
    Credit { account: String, amount: Amount },
    AppendTransaction(TransactionRecord),
    /// SUCCESS → REVERSED, only if still SUCCESS
    ReverseTransaction {
        id: String,
        actor: String,
        at: DateTime<Utc>,
    },
    SaveLoanRequest(LoanRequest),
    SaveDeletionRequest(DeletionRequest),
    /// New admin; username must be unused
    InsertAdmin(AdminUser),
    UpdateAdmin(AdminUser),
    DeleteAdmin(String),
}

/// Writes of one logical operation, applied atomically in order
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn debit(self, account: &str, amount: Amount) -> Self {
        self.push(WriteOp::Debit {
            account: account.to_string(),
            amount,
        })
    }

    pub fn credit(self, account: &str, amount: Amount) -> Self {
        self.push(WriteOp::Credit {
            account: account.to_string(),
            amount,
        })
    }

    pub fn update_account(self, account: &Account) -> Self {
        self.push(WriteOp::UpdateAccount(account.clone()))
    }

    pub fn update_admin(self, admin: &AdminUser) -> Self {
        self.push(WriteOp::UpdateAdmin(admin.clone()))
    }

    pub fn append(self, record: TransactionRecord) -> Self {
        self.push(WriteOp::AppendTransaction(record))
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// =========================================================================
// Queries
// =========================================================================

/// Transaction search; every field narrows the result
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tx_type: Option<TransactionType>,
    pub category: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Matches either endpoint
    pub account: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            tx_type: None,
            category: None,
            status: None,
            account: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn for_account(account: &str) -> Self {
        Self::new().with_account(account)
    }

    pub fn with_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// In-process predicate (the SQL store builds the same conditions)
    pub fn matches(&self, tx: &TransactionRecord) -> bool {
        self.from.map_or(true, |from| tx.created_at >= from)
            && self.to.map_or(true, |to| tx.created_at <= to)
            && self.tx_type.map_or(true, |t| tx.tx_type == t)
            && self.status.map_or(true, |s| tx.status == s)
            && self
                .category
                .as_deref()
                .map_or(true, |c| tx.category.eq_ignore_ascii_case(c))
            && self.account.as_deref().map_or(true, |a| tx.touches(a))
    }
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Port
// =========================================================================

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn account(&self, account_number: &str) -> Result<Option<Account>, StoreError>;

    /// Account holding this government ID (case-insensitive)
    async fn account_by_gov_id(&self, gov_id_number: &str) -> Result<Option<Account>, StoreError>;

    async fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn transaction(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError>;

    /// Matching transactions, newest first
    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn loan_request(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError>;

    /// Loan requests, newest first
    async fn loan_requests(
        &self,
        account_number: Option<&str>,
        status: Option<LoanStatus>,
    ) -> Result<Vec<LoanRequest>, StoreError>;

    async fn deletion_request(&self, id: Uuid) -> Result<Option<DeletionRequest>, StoreError>;

    /// Deletion requests, oldest first
    async fn deletion_requests(&self, status: Option<DeletionStatus>) -> Result<Vec<DeletionRequest>, StoreError>;

    /// Admin by username (case-insensitive)
    async fn admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError>;

    /// All admins, by username
    async fn admins(&self) -> Result<Vec<AdminUser>, StoreError>;

    /// Apply all ops or none
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Flip ACTIVE accounts idle since before `idle_since` to INACTIVE
    async fn mark_inactive(&self, idle_since: DateTime<Utc>) -> Result<Vec<String>, StoreError>;
}
