//! Command Handlers module
//!
//! Handlers orchestrate business operations over the shared `LedgerCore`:
//! take the account locks, load fresh state, validate, then commit one
//! `WriteBatch`. Audit and notifications follow a successful commit and
//! never fail the operation.

mod account_handler;
mod admin_handler;
mod auth_handler;
mod commands;
mod deletion_handler;
mod ledger_handler;
mod loan_handler;
mod query_handler;
mod transaction_log_handler;

pub use account_handler::AccountHandler;
pub use admin_handler::{AdminBootstrap, AdminHandler};
pub use auth_handler::AuthHandler;
pub use commands::*;
pub use deletion_handler::DeletionHandler;
pub use ledger_handler::LedgerHandler;
pub use loan_handler::LoanHandler;
pub use query_handler::QueryHandler;
pub use transaction_log_handler::TransactionLogHandler;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::{AuditAction, AuditLog, AuditLogBuilder, AuditSink};
use crate::domain::{Amount, DomainError, OperationContext, Role};
use crate::error::{AppError, AppResult};
use crate::idempotency::DuplicateGuard;
use crate::model::{Account, AdminUser, Track};
use crate::notify::{NotificationGateway, Notifier};
use crate::security::{AttemptOutcome, CredentialVerifier, LockoutTracker, OtpStore, SessionRegistry};
use crate::store::{AccountLocks, LedgerStore, StoreError, WriteBatch};

// =========================================================================
// Policy
// =========================================================================

/// Business knobs shared by all handlers
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPolicy {
    /// Smallest withdrawal or transfer
    pub min_debit: Decimal,
    pub lockout_threshold: u32,
    pub otp_expiry_minutes: i64,
    pub dedupe_window_ms: i64,
    pub inactivity_months: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            min_debit: Decimal::from(100),
            lockout_threshold: crate::security::lockout::DEFAULT_THRESHOLD,
            otp_expiry_minutes: crate::security::otp::DEFAULT_EXPIRY_MINUTES,
            dedupe_window_ms: crate::idempotency::DEFAULT_WINDOW_MS,
            inactivity_months: 6,
        }
    }
}

// =========================================================================
// Shared core
// =========================================================================

/// Everything a handler needs; cheap to clone
#[derive(Clone)]
pub struct LedgerCore {
    store: Arc<dyn LedgerStore>,
    audit: AuditLog,
    notifier: Notifier,
    locks: Arc<AccountLocks>,
    credentials: CredentialVerifier,
    lockout: LockoutTracker,
    otp: Arc<OtpStore>,
    guard: Arc<DuplicateGuard>,
    sessions: Arc<SessionRegistry>,
    policy: LedgerPolicy,
}

impl LedgerCore {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit_sink: Arc<dyn AuditSink>,
        gateway: Arc<dyn NotificationGateway>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            audit: AuditLog::new(audit_sink),
            notifier: Notifier::new(gateway),
            locks: Arc::new(AccountLocks::new()),
            credentials: CredentialVerifier::new(),
            lockout: LockoutTracker::new(policy.lockout_threshold),
            otp: Arc::new(OtpStore::new(policy.otp_expiry_minutes)),
            guard: Arc::new(DuplicateGuard::new(policy.dedupe_window_ms)),
            sessions: Arc::new(SessionRegistry::new()),
            policy,
        }
    }

    /// Replace the credential verifier (cheaper hashing cost in tests)
    pub fn with_credentials(mut self, credentials: CredentialVerifier) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn otp(&self) -> &OtpStore {
        &self.otp
    }

    pub fn guard(&self) -> &DuplicateGuard {
        &self.guard
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub(crate) fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn credentials(&self) -> &CredentialVerifier {
        &self.credentials
    }

    pub(crate) fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    // =========================================================================
    // Helpers shared by handlers
    // =========================================================================

    pub(crate) async fn load_account(&self, account_number: &str) -> AppResult<Account> {
        self.store
            .account(account_number)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_number.to_string()).into())
    }

    pub(crate) async fn load_admin(&self, username: &str) -> AppResult<AdminUser> {
        self.store
            .admin(username)
            .await?
            .ok_or_else(|| DomainError::AdminNotFound(username.to_string()).into())
    }

    pub(crate) async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        self.store.commit(batch).await.map_err(|e| {
            if e.is_infrastructure() {
                tracing::error!(error = %e, "Ledger commit failed");
            }
            AppError::from(e)
        })
    }

    /// Admins and internal callers act on any account; customers only on
    /// the account their session is bound to
    pub(crate) fn authorize_account(&self, context: &OperationContext, account_number: &str) -> AppResult<()> {
        match context.role {
            Role::Admin | Role::System => Ok(()),
            Role::Customer => Ok(context.require_session_for(account_number)?),
        }
    }

    /// Duplicate guard; runs before any business validation
    pub(crate) fn reject_duplicate(&self, key: &crate::idempotency::RequestKey, operation: &str) -> AppResult<()> {
        if self.guard.seen(key) {
            tracing::warn!(operation = %operation, "Duplicate request suppressed");
            return Err(DomainError::DuplicateRequest.into());
        }
        Ok(())
    }

    pub(crate) fn ensure_minimum_debit(&self, amount: &Amount) -> AppResult<()> {
        if amount.value() < self.policy.min_debit {
            return Err(DomainError::BelowMinimum {
                minimum: self.policy.min_debit,
                requested: amount.value(),
            }
            .into());
        }
        Ok(())
    }

    /// Fail if money may not leave `account`; audits aborted attempts on a
    /// locked transaction track
    pub(crate) async fn ensure_can_send(&self, account: &Account, context: &OperationContext) -> AppResult<()> {
        if let Err(e) = account.ensure_can_send() {
            if matches!(e, DomainError::TrackLocked(_)) {
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxAbortedLocked)
                            .account(&account.account_number)
                            .description("Transaction attempted while transaction capability is locked"),
                        context,
                    )
                    .await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Verify a transaction PIN against `account` (caller holds its lock).
    ///
    /// Counter changes and legacy-secret migration are committed before
    /// returning, so a failed attempt is never lost when the caller aborts.
    pub(crate) async fn check_transaction_pin(
        &self,
        account: &mut Account,
        pin: &str,
        context: &OperationContext,
    ) -> AppResult<()> {
        let track = Track::Transaction;
        let had_failures = account.tx_track.failures() > 0;
        let verification = if self.lockout.is_locked(account, track) {
            crate::security::Verification::Invalid
        } else {
            self.credentials.verify(pin, &account.transaction_secret)
        };
        let outcome = self.lockout.attempt(account, track, verification.is_valid(), Utc::now());
        let number = account.account_number.clone();

        match outcome {
            AttemptOutcome::AlreadyLocked => {
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxAbortedLocked)
                            .account(&number)
                            .description("Transaction PIN attempt on a locked track"),
                        context,
                    )
                    .await;
            }
            AttemptOutcome::Accepted => {
                let mut dirty = had_failures;
                if verification.needs_migration() {
                    account.transaction_secret = self.credentials.hash(pin)?;
                    dirty = true;
                }
                if dirty {
                    self.commit(WriteBatch::new().update_account(account)).await?;
                }
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxPinSuccess)
                            .account(&number)
                            .description("Transaction PIN verified"),
                        context,
                    )
                    .await;
            }
            AttemptOutcome::Rejected { remaining } => {
                self.commit(WriteBatch::new().update_account(account)).await?;
                tracing::warn!(account = %number, remaining, "Wrong transaction PIN");
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxPinFail)
                            .account(&number)
                            .description(format!("Wrong transaction PIN, {remaining} attempts left")),
                        context,
                    )
                    .await;
            }
            AttemptOutcome::LockedNow => {
                self.commit(WriteBatch::new().update_account(account)).await?;
                tracing::warn!(account = %number, "Transaction capability locked");
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxPinFail)
                            .account(&number)
                            .description("Wrong transaction PIN"),
                        context,
                    )
                    .await;
                self.audit
                    .record(
                        AuditLogBuilder::new(AuditAction::TxPinLock)
                            .account(&number)
                            .description("Transaction capability locked after repeated failures"),
                        context,
                    )
                    .await;
                self.notifier
                    .email(
                        &account.email,
                        "Transactions locked",
                        "Your transaction capability was locked after repeated wrong PIN entries. Contact your branch to unlock it.",
                    )
                    .await;
            }
        }

        Ok(outcome.into_result(track)?)
    }
}

/// Lock slot for an admin row; account numbers are all digits, so the
/// prefix keeps the two key spaces apart
pub(crate) fn admin_slot(username: &str) -> String {
    format!("admin:{}", username.trim().to_lowercase())
}

impl std::fmt::Debug for LedgerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerCore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Map a failed conditional debit onto the business error
pub(crate) fn debit_error(err: AppError, required: Decimal, available: Decimal) -> AppError {
    match err {
        AppError::Store(StoreError::InsufficientBalance(_)) => {
            DomainError::insufficient_funds(required, available).into()
        }
        other => other,
    }
}
