//! Transaction Log Handler
//!
//! Direct appends to the log and admin rollback of a committed entry.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{DomainError, OperationContext};
use crate::error::{AppError, AppResult};
use crate::model::{TransactionRecord, TransactionStatus, TransactionType};
use crate::store::{StoreError, WriteBatch, WriteOp};

use super::{debit_error, LedgerCore};

pub struct TransactionLogHandler {
    core: LedgerCore,
}

impl TransactionLogHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    /// Append `record` and apply its balance effect in the same write
    /// (internal callers only).
    ///
    /// Only SUCCESS entries of a reversible type are accepted, so every
    /// logged entry matches money that really moved and a later rollback
    /// can never mint or burn funds. Returns `false` (nothing written) for
    /// a self-transfer or for money leaving a transaction-locked account.
    pub async fn record(&self, record: TransactionRecord, context: &OperationContext) -> AppResult<bool> {
        context.require_system()?;

        if record.status != TransactionStatus::Success {
            return Err(DomainError::invalid_field("status", "only SUCCESS entries can be recorded").into());
        }
        if !record.tx_type.is_reversible() {
            return Err(DomainError::invalid_field(
                "tx_type",
                format!("{} entries are written by their own workflow", record.tx_type),
            )
            .into());
        }
        if record.tx_type == TransactionType::Transfer && record.from_account == record.to_account {
            tracing::warn!(tx_id = %record.id, "Refusing to record a self-transfer");
            return Ok(false);
        }

        let (source, target) = match record.tx_type {
            TransactionType::Deposit => (None, record.to_account.as_deref()),
            TransactionType::Withdraw => (record.from_account.as_deref(), None),
            _ => (record.from_account.as_deref(), record.to_account.as_deref()),
        };
        let complete = match record.tx_type {
            TransactionType::Transfer => source.is_some() && target.is_some(),
            _ => source.is_some() || target.is_some(),
        };
        if !complete {
            return Err(DomainError::invalid_field("account", format!("{} entry is missing an endpoint", record.tx_type)).into());
        }

        let mut endpoints: Vec<&str> = Vec::with_capacity(2);
        endpoints.extend(source);
        endpoints.extend(target);
        let _guard = self.core.locks().lock_all(&endpoints).await;

        let amount = record.amount;
        let mut batch = WriteBatch::new();
        let mut available = None;

        if let Some(from) = source {
            let account = self.core.load_account(from).await?;
            account.ensure_not_deleted()?;
            if account.tx_track.is_locked() {
                tracing::warn!(tx_id = %record.id, account = %from, "Refusing to record a debit from a locked account");
                self.core
                    .audit()
                    .record(
                        AuditLogBuilder::new(AuditAction::TxAbortedLocked)
                            .account(from)
                            .description(format!("{} entry refused while transactions are locked", record.tx_type)),
                        context,
                    )
                    .await;
                return Ok(false);
            }
            account.ensure_covers(&amount)?;
            available = Some(account.balance.value());
            batch = batch.debit(from, amount);
        }
        if let Some(to) = target {
            self.core.load_account(to).await?.ensure_not_deleted()?;
            batch = batch.credit(to, amount);
        }

        let id = record.id.clone();
        let tx_type = record.tx_type;
        self.core
            .commit(batch.append(record))
            .await
            .map_err(|e| debit_error(e, amount.value(), available.unwrap_or_default()))?;

        tracing::debug!(tx_id = %id, tx_type = %tx_type, "Transaction recorded");
        Ok(true)
    }

    /// Reverse the balance effect of a committed entry (admin only).
    ///
    /// `Ok(false)` when the entry was already reversed, is of a type that
    /// cannot be reversed, or when a credited account no longer holds the
    /// amount to claw back. No partial effect is ever applied.
    pub async fn rollback(&self, transaction_id: &str, context: &OperationContext) -> AppResult<bool> {
        context.require_admin()?;

        let record = self
            .core
            .store()
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| DomainError::TransactionNotFound(transaction_id.to_string()))?;

        if !record.tx_type.is_reversible() {
            tracing::warn!(tx_id = %transaction_id, tx_type = %record.tx_type, "Transaction type cannot be reversed");
            return Ok(false);
        }

        let mut endpoints: Vec<&str> = Vec::with_capacity(2);
        endpoints.extend(record.from_account.as_deref());
        endpoints.extend(record.to_account.as_deref());
        let _guard = self.core.locks().lock_all(&endpoints).await;

        // Re-read under the locks; a concurrent rollback may have won
        let record = match self.core.store().transaction(transaction_id).await? {
            Some(r) => r,
            None => return Err(DomainError::TransactionNotFound(transaction_id.to_string()).into()),
        };
        if record.status != TransactionStatus::Success {
            tracing::info!(tx_id = %transaction_id, "Transaction already reversed");
            return Ok(false);
        }

        let batch = match self.reversal(&record).await? {
            Some(batch) => batch,
            None => return Ok(false),
        };
        let batch = batch.push(WriteOp::ReverseTransaction {
            id: record.id.clone(),
            actor: context.actor.clone(),
            at: Utc::now(),
        });

        match self.core.commit(batch).await {
            Ok(()) => {}
            Err(AppError::Store(StoreError::AlreadyReversed(_))) => return Ok(false),
            Err(AppError::Store(StoreError::InsufficientBalance(account))) => {
                tracing::warn!(tx_id = %transaction_id, account = %account, "Rollback refused at commit, claw-back not covered");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(tx_id = %transaction_id, tx_type = %record.tx_type, actor = %context.actor, "Transaction rolled back");
        let account = record
            .to_account
            .as_deref()
            .or(record.from_account.as_deref())
            .unwrap_or_default();
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::Rollback)
                    .account(account)
                    .description(format!(
                        "Reversed {} {} of {}",
                        record.tx_type, record.id, record.amount
                    )),
                context,
            )
            .await;

        Ok(true)
    }

    /// Balance ops undoing `record`; `None` when a claw-back is not covered
    /// or an endpoint account no longer exists
    async fn reversal(&self, record: &TransactionRecord) -> AppResult<Option<WriteBatch>> {
        let amount = record.amount;
        let batch = WriteBatch::new();

        let batch = match record.tx_type {
            TransactionType::Deposit => {
                let Some(to) = record.to_account.as_deref() else {
                    return Ok(None);
                };
                if !self.covers_claw_back(to, amount.value()).await? {
                    return Ok(None);
                }
                batch.debit(to, amount)
            }
            TransactionType::Withdraw => {
                let Some(from) = record.from_account.as_deref() else {
                    return Ok(None);
                };
                if self.core.store().account(from).await?.is_none() {
                    tracing::warn!(tx_id = %record.id, account = %from, "Rollback source account no longer exists");
                    return Ok(None);
                }
                batch.credit(from, amount)
            }
            TransactionType::Transfer => {
                let (Some(from), Some(to)) = (record.from_account.as_deref(), record.to_account.as_deref()) else {
                    return Ok(None);
                };
                if self.core.store().account(from).await?.is_none() || !self.covers_claw_back(to, amount.value()).await? {
                    return Ok(None);
                }
                batch.debit(to, amount).credit(from, amount)
            }
            _ => return Ok(None),
        };

        Ok(Some(batch))
    }

    async fn covers_claw_back(&self, account_number: &str, required: Decimal) -> AppResult<bool> {
        let Some(account) = self.core.store().account(account_number).await? else {
            tracing::warn!(account = %account_number, "Rollback target account no longer exists");
            return Ok(false);
        };
        let available = account.balance.value();
        if available < required {
            let refusal = DomainError::InsufficientBalanceForRollback {
                account: account_number.to_string(),
                required,
                available,
            };
            tracing::warn!(reason = %refusal, "Rollback refused");
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::super::{DepositCommand, LedgerHandler, TransferCommand, WithdrawCommand};
    use super::*;
    use crate::domain::Amount;
    use crate::model::account::fixtures::account;
    use crate::model::LockTrack;
    use rust_decimal_macros::dec;

    fn admin() -> OperationContext {
        OperationContext::admin("ops")
    }

    #[tokio::test]
    async fn test_rollback_deposit_once() {
        let h = harness();
        h.seed(account("12345678901", dec!(5000))).await;
        let ledger = LedgerHandler::new(h.core.clone());
        let log = TransactionLogHandler::new(h.core.clone());

        let deposit = ledger
            .deposit(DepositCommand::new("12345678901", "1000"), &OperationContext::system())
            .await
            .unwrap();

        assert!(log.rollback(&deposit.transaction_id, &admin()).await.unwrap());
        assert!(!log.rollback(&deposit.transaction_id, &admin()).await.unwrap());
        assert_eq!(h.balance("12345678901").await, dec!(5000));

        let stored = h.core.store().transaction(&deposit.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Reversed);
        assert_eq!(stored.rolled_back_by.as_deref(), Some("ops"));
        assert_eq!(stored.amount.value(), dec!(1000));
        assert_eq!(h.audit.count(AuditAction::Rollback), 1);
    }

    #[tokio::test]
    async fn test_rollback_withdraw_credits_source() {
        let h = harness();
        h.seed(account("12345678901", dec!(5000))).await;
        let ledger = LedgerHandler::new(h.core.clone());
        let log = TransactionLogHandler::new(h.core.clone());

        let withdrawal = ledger
            .withdraw(
                WithdrawCommand::new("12345678901", "700", "2222"),
                &OperationContext::customer("12345678901"),
            )
            .await
            .unwrap();
        assert_eq!(h.balance("12345678901").await, dec!(4300));

        assert!(log.rollback(&withdrawal.transaction_id, &admin()).await.unwrap());
        assert_eq!(h.balance("12345678901").await, dec!(5000));
    }

    #[tokio::test]
    async fn test_rollback_transfer_refused_when_recipient_spent() {
        let h = harness();
        h.seed(account("12345678901", dec!(5100))).await;
        h.seed(account("10987654321", dec!(500))).await;
        let ledger = LedgerHandler::new(h.core.clone());
        let log = TransactionLogHandler::new(h.core.clone());

        let transfer = ledger
            .transfer(
                TransferCommand::new("12345678901", "10987654321", "2000", "ASTN00PUN03", "2222"),
                &OperationContext::customer("12345678901"),
            )
            .await
            .unwrap();
        ledger
            .withdraw(
                WithdrawCommand::new("10987654321", "2000", "2222"),
                &OperationContext::customer("10987654321"),
            )
            .await
            .unwrap();

        assert!(!log.rollback(&transfer.transaction_id, &admin()).await.unwrap());
        assert_eq!(h.balance("12345678901").await, dec!(3100));
        assert_eq!(h.balance("10987654321").await, dec!(500));
        let stored = h.core.store().transaction(&transfer.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_rollback_requires_admin_and_existing_tx() {
        let h = harness();
        let log = TransactionLogHandler::new(h.core.clone());

        let err = log
            .rollback("TX00000000000000000000", &OperationContext::customer("12345678901"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminRequired)));

        let err = log.rollback("TX00000000000000000000", &admin()).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_record_refuses_self_transfer_and_locked_source() {
        let h = harness();
        let mut locked = account("12345678901", dec!(1000));
        locked.tx_track = LockTrack::Locked { since: Utc::now() };
        h.seed(locked).await;
        let log = TransactionLogHandler::new(h.core.clone());
        let amount = Amount::from_integer(100).unwrap();

        let self_transfer = TransactionRecord::new(
            TransactionType::Transfer,
            Some("10987654321".into()),
            Some("10987654321".into()),
            amount,
            None,
            Utc::now(),
        );
        assert!(!log.record(self_transfer, &OperationContext::system()).await.unwrap());

        let locked_withdraw = TransactionRecord::new(
            TransactionType::Withdraw,
            Some("12345678901".into()),
            None,
            amount,
            None,
            Utc::now(),
        );
        assert!(!log.record(locked_withdraw, &OperationContext::system()).await.unwrap());

        let deposit = TransactionRecord::new(
            TransactionType::Deposit,
            None,
            Some("12345678901".into()),
            amount,
            None,
            Utc::now(),
        );
        let id = deposit.id.clone();
        assert!(log.record(deposit, &OperationContext::system()).await.unwrap());
        assert!(h.core.store().transaction(&id).await.unwrap().is_some());
        assert_eq!(h.balance("12345678901").await, dec!(1100));
    }

    fn withdrawal(from: &str, value: i64) -> TransactionRecord {
        TransactionRecord::new(
            TransactionType::Withdraw,
            Some(from.into()),
            None,
            Amount::from_integer(value).unwrap(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_record_is_internal_only() {
        let h = harness();
        h.seed(account("12345678901", dec!(5000))).await;
        let log = TransactionLogHandler::new(h.core.clone());

        for ctx in [OperationContext::customer("12345678901"), admin()] {
            let entry = withdrawal("12345678901", 3000);
            let id = entry.id.clone();
            let err = log.record(entry, &ctx).await.unwrap_err();
            assert!(matches!(err, AppError::Domain(DomainError::InternalCallerRequired)));
            assert!(h.core.store().transaction(&id).await.unwrap().is_none());
        }
        assert_eq!(h.balance("12345678901").await, dec!(5000));
    }

    #[tokio::test]
    async fn test_recorded_withdrawal_then_rollback_conserves_balance() {
        let h = harness();
        h.seed(account("12345678901", dec!(5000))).await;
        let log = TransactionLogHandler::new(h.core.clone());

        let entry = withdrawal("12345678901", 3000);
        let id = entry.id.clone();
        assert!(log.record(entry, &OperationContext::system()).await.unwrap());
        assert_eq!(h.balance("12345678901").await, dec!(2000));

        assert!(log.rollback(&id, &admin()).await.unwrap());
        assert!(!log.rollback(&id, &admin()).await.unwrap());
        assert_eq!(h.balance("12345678901").await, dec!(5000));
    }

    #[tokio::test]
    async fn test_record_refuses_entries_that_cannot_move_money() {
        let h = harness();
        h.seed(account("12345678901", dec!(5000))).await;
        let log = TransactionLogHandler::new(h.core.clone());
        let system = OperationContext::system();

        let err = log.record(withdrawal("12345678901", 9000), &system).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InsufficientFunds { .. })));

        let mut reversed = withdrawal("12345678901", 100);
        reversed.status = TransactionStatus::Reversed;
        let err = log.record(reversed, &system).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidField { field: "status", .. })));

        let loan_credit = TransactionRecord::new(
            TransactionType::LoanCredit,
            None,
            Some("12345678901".into()),
            Amount::from_integer(100).unwrap(),
            None,
            Utc::now(),
        );
        let err = log.record(loan_credit, &system).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidField { field: "tx_type", .. })));

        let err = log.record(withdrawal("55555555555", 100), &system).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AccountNotFound(_))));

        assert_eq!(h.balance("12345678901").await, dec!(5000));
        assert!(h
            .core
            .store()
            .transactions(&crate::store::TransactionFilter::new())
            .await
            .unwrap()
            .is_empty());
    }
}
