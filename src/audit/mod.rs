//! Audit Log
//!
//! Append-only record of security and money events. Recording is
//! best-effort: `AuditLog::record` never fails the calling operation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;

// =========================================================================
// Vocabulary
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    CreateAccount,
    LoginSuccess,
    LoginFailed,
    LockAccount,
    UnlockAccount,
    TxPinSuccess,
    TxPinFail,
    TxPinLock,
    UnlockTx,
    PinReset,
    TxPinReset,
    Deposit,
    Withdraw,
    Transfer,
    TxAbortedLocked,
    Rollback,
    LoanRequested,
    LoanApproved,
    LoanRejected,
    LoanClosed,
    AccountSoftDeleted,
    AccountRestored,
    DeleteAccount,
    DeletionRequested,
    DeletionApproved,
    DeletionRejected,
    ProfileUpdated,
    AccountInactive,
    AdminCreated,
    AdminUpdated,
    AdminDeleted,
    PasswordReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateAccount => "CREATE_ACCOUNT",
            AuditAction::LoginSuccess => "LOGIN_SUCCESS",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::LockAccount => "LOCK_ACCOUNT",
            AuditAction::UnlockAccount => "UNLOCK_ACCOUNT",
            AuditAction::TxPinSuccess => "TX_PIN_SUCCESS",
            AuditAction::TxPinFail => "TX_PIN_FAIL",
            AuditAction::TxPinLock => "TX_PIN_LOCK",
            AuditAction::UnlockTx => "UNLOCK_TX",
            AuditAction::PinReset => "PIN_RESET",
            AuditAction::TxPinReset => "TX_PIN_RESET",
            AuditAction::Deposit => "DEPOSIT",
            AuditAction::Withdraw => "WITHDRAW",
            AuditAction::Transfer => "TRANSFER",
            AuditAction::TxAbortedLocked => "TX_ABORTED_LOCKED",
            AuditAction::Rollback => "ROLLBACK",
            AuditAction::LoanRequested => "LOAN_REQUESTED",
            AuditAction::LoanApproved => "LOAN_APPROVED",
            AuditAction::LoanRejected => "LOAN_REJECTED",
            AuditAction::LoanClosed => "LOAN_CLOSED",
            AuditAction::AccountSoftDeleted => "ACCOUNT_SOFT_DELETED",
            AuditAction::AccountRestored => "ACCOUNT_RESTORED",
            AuditAction::DeleteAccount => "DELETE_ACCOUNT",
            AuditAction::DeletionRequested => "DELETION_REQUESTED",
            AuditAction::DeletionApproved => "DELETION_APPROVED",
            AuditAction::DeletionRejected => "DELETION_REJECTED",
            AuditAction::ProfileUpdated => "PROFILE_UPDATED",
            AuditAction::AccountInactive => "ACCOUNT_INACTIVE",
            AuditAction::AdminCreated => "ADMIN_CREATED",
            AuditAction::AdminUpdated => "ADMIN_UPDATED",
            AuditAction::AdminDeleted => "ADMIN_DELETED",
            AuditAction::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =========================================================================
// Entries
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    pub account_number: Option<String>,
    pub description: String,
    pub actor: String,
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Builder for audit entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    account_number: Option<String>,
    description: String,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            account_number: None,
            description: String::new(),
        }
    }

    pub fn account(mut self, account_number: &str) -> Self {
        self.account_number = Some(account_number.to_string());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Stamp actor, correlation and time from the calling context
    pub fn build(self, context: &OperationContext, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            event_type: self.action.as_str().to_string(),
            account_number: self.account_number,
            description: self.description,
            actor: context.actor.clone(),
            correlation_id: context.correlation_id,
            timestamp: at,
        }
    }
}

// =========================================================================
// Sinks
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Writes to the `audit_log` table
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent entries for an account
    pub async fn recent_for(&self, account_number: &str, limit: i64) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<(String, Option<String>, String, String, Option<Uuid>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT event_type, account_number, description, actor, correlation_id, created_at
            FROM audit_log
            WHERE account_number = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(account_number)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event_type, account_number, description, actor, correlation_id, timestamp)| AuditEntry {
                event_type,
                account_number,
                description,
                actor,
                correlation_id,
                timestamp,
            })
            .collect())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (event_type, account_number, description, actor, correlation_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.event_type)
        .bind(&entry.account_number)
        .bind(&entry.description)
        .bind(&entry.actor)
        .bind(entry.correlation_id)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Event types recorded so far, in order
    pub fn event_types(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.event_type).collect()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.event_type == action.as_str())
            .count()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

// =========================================================================
// Best-effort front
// =========================================================================

#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an entry; a sink failure is logged and swallowed
    pub async fn record(&self, builder: AuditLogBuilder, context: &OperationContext) {
        let entry = builder.build(context, Utc::now());
        match self.sink.record(&entry).await {
            Ok(()) => tracing::debug!(
                action = %entry.event_type,
                actor = %entry.actor,
                "Audit log entry created"
            ),
            Err(e) => tracing::warn!(
                action = %entry.event_type,
                error = %e,
                "Audit write failed"
            ),
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::TxPinLock.as_str(), "TX_PIN_LOCK");
        assert_eq!(AuditAction::AccountSoftDeleted.to_string(), "ACCOUNT_SOFT_DELETED");
    }

    #[test]
    fn test_builder_stamps_context() {
        let ctx = OperationContext::admin("root");
        let entry = AuditLogBuilder::new(AuditAction::Rollback)
            .account("12345678901")
            .description("Reversed TX1")
            .build(&ctx, Utc::now());

        assert_eq!(entry.event_type, "ROLLBACK");
        assert_eq!(entry.actor, "root");
        assert_eq!(entry.account_number.as_deref(), Some("12345678901"));
    }

    #[tokio::test]
    async fn test_failing_sink_is_swallowed() {
        let log = AuditLog::new(Arc::new(FailingSink));
        log.record(AuditLogBuilder::new(AuditAction::Deposit), &OperationContext::system())
            .await;
    }

    #[tokio::test]
    async fn test_in_memory_sink_keeps_order() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let log = AuditLog::new(sink.clone());
        let ctx = OperationContext::system();
        log.record(AuditLogBuilder::new(AuditAction::LoginFailed), &ctx).await;
        log.record(AuditLogBuilder::new(AuditAction::LockAccount), &ctx).await;

        assert_eq!(sink.event_types(), vec!["LOGIN_FAILED", "LOCK_ACCOUNT"]);
        assert_eq!(sink.count(AuditAction::LockAccount), 1);
    }
}
