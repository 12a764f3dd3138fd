//! bank_ledger Library
//!
//! Core bank ledger: accounts, guarded money movement, credential lockout,
//! loans and account lifecycle. Re-exports modules for integration testing
//! and embedding.

pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod jobs;
pub mod model;
pub mod notify;
pub mod report;
pub mod security;
pub mod store;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use error::{AppError, AppResult};
pub use handlers::{LedgerCore, LedgerPolicy};
