//! Ledger Handler
//!
//! Deposit, withdraw and transfer. Every operation holds the involved
//! account locks from the first read until the commit, and writes its
//! balance changes and its single transaction record in one batch.

use chrono::Utc;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{Amount, DomainError, OperationContext};
use crate::error::AppResult;
use crate::idempotency::RequestKey;
use crate::model::{AccountStatus, TransactionRecord, TransactionType};
use crate::store::WriteBatch;

use super::{debit_error, DepositCommand, LedgerCore, MovementResult, TransferCommand, WithdrawCommand};

pub struct LedgerHandler {
    core: LedgerCore,
}

impl LedgerHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    // =========================================================================
    // Deposit
    // =========================================================================

    pub async fn deposit(&self, command: DepositCommand, context: &OperationContext) -> AppResult<MovementResult> {
        let amount: Amount = command.amount.parse().map_err(DomainError::from)?;
        let number = command.account_number.trim();
        self.core.reject_duplicate(
            &RequestKey::deposit(number, &amount, command.client_token.as_deref()),
            "deposit",
        )?;

        self.core.authorize_account(context, number)?;
        let _guard = self.core.locks().lock(number).await;

        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        let now = Utc::now();
        let record = TransactionRecord::new(
            TransactionType::Deposit,
            None,
            Some(account.account_number.clone()),
            amount,
            command.category,
            now,
        );
        let transaction_id = record.id.clone();

        if account.status == AccountStatus::Inactive {
            tracing::info!(account = %number, "Deposit reactivates inactive account");
            account.status = AccountStatus::Active;
        }
        account.last_activity = now;

        self.core
            .commit(
                WriteBatch::new()
                    .credit(number, amount)
                    .update_account(&account)
                    .append(record),
            )
            .await?;

        let balance = account.balance.value() + amount.value();
        tracing::info!(account = %number, tx_id = %transaction_id, amount = %amount, "Deposit committed");

        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::Deposit)
                    .account(number)
                    .description(format!("Deposited {amount} ({transaction_id})")),
                context,
            )
            .await;
        let text = format!("{amount} credited to account {number}. Available balance: {balance:.2}");
        self.core.notifier().email(&account.email, "Amount credited", &text).await;
        self.core.notifier().sms(&account.phone, &text).await;

        Ok(MovementResult {
            transaction_id,
            account_number: number.to_string(),
            amount: amount.value(),
            balance,
        })
    }

    // =========================================================================
    // Withdraw
    // =========================================================================

    pub async fn withdraw(&self, command: WithdrawCommand, context: &OperationContext) -> AppResult<MovementResult> {
        let amount: Amount = command.amount.parse().map_err(DomainError::from)?;
        let number = command.account_number.trim();
        self.core.reject_duplicate(
            &RequestKey::withdraw(number, &amount, command.client_token.as_deref()),
            "withdraw",
        )?;

        self.core.authorize_account(context, number)?;
        let _guard = self.core.locks().lock(number).await;

        let mut account = self.core.load_account(number).await?;
        self.core.ensure_can_send(&account, context).await?;
        self.core.ensure_minimum_debit(&amount)?;
        account.ensure_covers(&amount)?;
        self.core
            .check_transaction_pin(&mut account, &command.transaction_pin, context)
            .await?;

        let now = Utc::now();
        let record = TransactionRecord::new(
            TransactionType::Withdraw,
            Some(account.account_number.clone()),
            None,
            amount,
            command.category,
            now,
        );
        let transaction_id = record.id.clone();
        let available = account.balance.value();
        account.last_activity = now;

        self.core
            .commit(
                WriteBatch::new()
                    .debit(number, amount)
                    .update_account(&account)
                    .append(record),
            )
            .await
            .map_err(|e| debit_error(e, amount.value(), available))?;

        let balance = available - amount.value();
        tracing::info!(account = %number, tx_id = %transaction_id, amount = %amount, "Withdrawal committed");

        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::Withdraw)
                    .account(number)
                    .description(format!("Withdrew {amount} ({transaction_id})")),
                context,
            )
            .await;
        let text = format!("{amount} debited from account {number}. Available balance: {balance:.2}");
        self.core.notifier().email(&account.email, "Amount debited", &text).await;
        self.core.notifier().sms(&account.phone, &text).await;

        Ok(MovementResult {
            transaction_id,
            account_number: number.to_string(),
            amount: amount.value(),
            balance,
        })
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    pub async fn transfer(&self, command: TransferCommand, context: &OperationContext) -> AppResult<MovementResult> {
        let amount: Amount = command.amount.parse().map_err(DomainError::from)?;
        let from = command.from_account.trim();
        let to = command.to_account.trim();
        self.core.reject_duplicate(
            &RequestKey::transfer(from, to, &amount, command.client_token.as_deref()),
            "transfer",
        )?;

        self.core.authorize_account(context, from)?;
        if from == to {
            return Err(DomainError::SameAccountTransfer.into());
        }

        let _guard = self.core.locks().lock_all(&[from, to]).await;

        let mut sender = self.core.load_account(from).await?;
        let mut recipient = self.core.load_account(to).await?;

        self.core.ensure_can_send(&sender, context).await?;
        recipient.ensure_not_deleted()?;
        if !recipient.matches_ifsc(&command.expected_ifsc) {
            tracing::warn!(from = %from, to = %to, "Transfer IFSC mismatch");
            return Err(DomainError::IfscMismatch.into());
        }
        self.core.ensure_minimum_debit(&amount)?;
        sender.ensure_covers(&amount)?;
        self.core
            .check_transaction_pin(&mut sender, &command.transaction_pin, context)
            .await?;

        let now = Utc::now();
        let record = TransactionRecord::new(
            TransactionType::Transfer,
            Some(sender.account_number.clone()),
            Some(recipient.account_number.clone()),
            amount,
            command.category,
            now,
        );
        let transaction_id = record.id.clone();
        let available = sender.balance.value();
        sender.last_activity = now;
        if recipient.status == AccountStatus::Inactive {
            recipient.status = AccountStatus::Active;
        }
        recipient.last_activity = now;

        self.core
            .commit(
                WriteBatch::new()
                    .debit(from, amount)
                    .credit(to, amount)
                    .update_account(&sender)
                    .update_account(&recipient)
                    .append(record),
            )
            .await
            .map_err(|e| debit_error(e, amount.value(), available))?;

        let balance = available - amount.value();
        let recipient_balance = recipient.balance.value() + amount.value();
        tracing::info!(from = %from, to = %to, tx_id = %transaction_id, amount = %amount, "Transfer committed");

        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::Transfer)
                    .account(from)
                    .description(format!("Transferred {amount} to {to} ({transaction_id})")),
                context,
            )
            .await;

        let sent = format!("{amount} transferred to account {to}. Available balance: {balance:.2}");
        self.core.notifier().email(&sender.email, "Transfer sent", &sent).await;
        self.core.notifier().sms(&sender.phone, &sent).await;
        let received = format!("{amount} received from account {from}. Available balance: {recipient_balance:.2}");
        self.core.notifier().email(&recipient.email, "Transfer received", &received).await;
        self.core.notifier().sms(&recipient.phone, &received).await;

        Ok(MovementResult {
            transaction_id,
            account_number: from.to_string(),
            amount: amount.value(),
            balance,
        })
    }
}
