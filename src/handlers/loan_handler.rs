//! Loan Handler
//!
//! Request → admin decision → early closure. The account carries at most
//! one outstanding loan; its terms are fixed when the request is approved.

use chrono::{Duration, Months, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::loan_terms::{self, EmiQuote};
use crate::domain::{Amount, DomainError, EmiPlan, OperationContext};
use crate::error::AppResult;
use crate::model::{
    Account, LoanMetadata, LoanRequest, LoanStatus, TransactionRecord, TransactionStatus, TransactionType,
};
use crate::store::{TransactionFilter, WriteBatch, WriteOp};

use super::{
    debit_error, LedgerCore, LoanApplication, LoanClosureResult, LoanDecision, LoanRequestResult,
    LoanStatusView, Recommendation, ReviewSuggestion,
};

/// Balance above which a request is worth approving
const REVIEW_MIN_BALANCE: i64 = 5_000;
/// Recent credits above which a request is worth approving
const REVIEW_MIN_CREDITS: i64 = 20_000;
const REVIEW_WINDOW_MONTHS: u32 = 6;
const REVIEW_SCAN_LIMIT: usize = 10_000;

const LOAN_CREDIT_CATEGORY: &str = "Loan Sanctioned";
const LOAN_REPAYMENT_CATEGORY: &str = "Loan Early Closure";

pub struct LoanHandler {
    core: LedgerCore,
}

impl LoanHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    /// Non-binding repayment figures
    pub fn preview(&self, amount: &str, loan_type: &str, emi_plan: &str) -> AppResult<EmiQuote> {
        let amount: Amount = amount.parse().map_err(DomainError::from)?;
        let plan = EmiPlan::parse(emi_plan)?;
        Ok(loan_terms::quote(&amount, loan_type, plan))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    pub async fn request(&self, application: LoanApplication, context: &OperationContext) -> AppResult<LoanRequestResult> {
        let number = application.account_number.trim();
        context.require_session_for(number)?;

        let amount: Amount = application.amount.parse().map_err(DomainError::from)?;
        let plan = EmiPlan::parse(&application.emi_plan)?;
        let loan_type = application.loan_type.trim();
        if loan_type.is_empty() {
            return Err(DomainError::invalid_field("loan type", "is required").into());
        }
        if application.kyc_proof.is_empty() {
            return Err(DomainError::invalid_field("KYC proof", "document is required").into());
        }

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        if account.has_loan() {
            return Err(DomainError::ActiveLoan(number.to_string()).into());
        }
        let pending = self
            .core
            .store()
            .loan_requests(Some(number), Some(LoanStatus::Pending))
            .await?;
        if !pending.is_empty() {
            return Err(DomainError::PendingLoanExists(number.to_string()).into());
        }
        if !account.matches_gov_id(&application.gov_id_number) {
            tracing::warn!(account = %number, "Loan request with mismatching government ID");
            return Err(DomainError::IdentityMismatch.into());
        }

        let required = loan_terms::minimum_maintained_balance(&amount);
        if account.balance.value() < required {
            return Err(DomainError::insufficient_funds(required, account.balance.value()).into());
        }

        self.core
            .check_transaction_pin(&mut account, &application.transaction_pin, context)
            .await?;

        let quote = loan_terms::quote(&amount, loan_type, plan);
        let request = LoanRequest {
            id: Uuid::new_v4(),
            account_number: number.to_string(),
            amount,
            interest_rate: quote.interest_rate,
            loan_type: loan_type.to_string(),
            emi_plan: plan,
            gov_id_echo: application.gov_id_number.trim().to_string(),
            kyc_proof: application.kyc_proof,
            status: LoanStatus::Pending,
            admin_comment: None,
            processed_by: None,
            requested_at: Utc::now(),
            processed_at: None,
        };
        let request_id = request.id;

        self.core
            .commit(WriteBatch::new().push(WriteOp::SaveLoanRequest(request)))
            .await?;

        tracing::info!(account = %number, request_id = %request_id, amount = %amount, "Loan requested");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::LoanRequested)
                    .account(number)
                    .description(format!("{loan_type} of {amount} requested ({request_id})")),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "Loan request received",
                &format!("Your {loan_type} request for {amount} is under review."),
            )
            .await;

        Ok(LoanRequestResult {
            request_id,
            amount: amount.value(),
            interest_rate: quote.interest_rate,
            total_payable: quote.total_payable,
        })
    }

    // =========================================================================
    // Admin decisions
    // =========================================================================

    pub async fn approve(&self, request_id: Uuid, comment: Option<String>, context: &OperationContext) -> AppResult<LoanDecision> {
        context.require_admin()?;
        let account_number = self.load_request(request_id).await?.account_number;

        let _guard = self.core.locks().lock(&account_number).await;
        let mut request = self.load_request(request_id).await?;
        let mut account = self.core.load_account(&account_number).await?;
        account.ensure_not_deleted()?;
        if account.has_loan() {
            return Err(DomainError::ActiveLoan(account_number).into());
        }

        let now = Utc::now();
        request.advance(LoanStatus::Approved, &context.actor, comment, now)?;

        let principal = request.amount;
        let total_due = loan_terms::total_due(&principal, request.interest_rate);
        account.loan = Some(LoanMetadata {
            principal: principal.value(),
            interest_rate: request.interest_rate,
            total_due,
            loan_type: request.loan_type.clone(),
            emi_plan: request.emi_plan,
            taken_at: now,
        });
        account.loan_last_paid_at = None;
        account.last_activity = now;

        let record = TransactionRecord::new(
            TransactionType::LoanCredit,
            None,
            Some(account_number.clone()),
            principal,
            Some(LOAN_CREDIT_CATEGORY.to_string()),
            now,
        );
        let transaction_id = record.id.clone();

        self.core
            .commit(
                WriteBatch::new()
                    .credit(&account_number, principal)
                    .update_account(&account)
                    .append(record)
                    .push(WriteOp::SaveLoanRequest(request.clone())),
            )
            .await?;

        tracing::info!(account = %account_number, request_id = %request_id, total_due = %total_due, "Loan approved");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::LoanApproved)
                    .account(&account_number)
                    .description(format!("Loan {request_id} approved, {principal} credited, {total_due} due")),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "Loan approved",
                &format!("Your loan of {principal} was approved and credited. Total due: {total_due:.2}"),
            )
            .await;

        Ok(LoanDecision {
            request,
            transaction_id: Some(transaction_id),
        })
    }

    pub async fn reject(&self, request_id: Uuid, comment: Option<String>, context: &OperationContext) -> AppResult<LoanDecision> {
        context.require_admin()?;
        let account_number = self.load_request(request_id).await?.account_number;

        let _guard = self.core.locks().lock(&account_number).await;
        let mut request = self.load_request(request_id).await?;
        request.advance(LoanStatus::Rejected, &context.actor, comment, Utc::now())?;

        let mut batch = WriteBatch::new().push(WriteOp::SaveLoanRequest(request.clone()));
        let account = self.core.store().account(&account_number).await?;
        if let Some(mut account) = account.clone() {
            // Loan metadata without any approved request behind it is stale
            let approved = self
                .core
                .store()
                .loan_requests(Some(&account_number), Some(LoanStatus::Approved))
                .await?;
            if account.has_loan() && approved.is_empty() {
                tracing::warn!(account = %account_number, "Clearing loan metadata with no approved request");
                account.loan = None;
                batch = batch.update_account(&account);
            }
        }

        self.core.commit(batch).await?;

        tracing::info!(account = %account_number, request_id = %request_id, "Loan rejected");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::LoanRejected)
                    .account(&account_number)
                    .description(format!(
                        "Loan {request_id} rejected: {}",
                        request.admin_comment.as_deref().unwrap_or("no comment")
                    )),
                context,
            )
            .await;
        if let Some(account) = account {
            self.core
                .notifier()
                .email(&account.email, "Loan request rejected", "Your loan request was not approved.")
                .await;
        }

        Ok(LoanDecision {
            request,
            transaction_id: None,
        })
    }

    // =========================================================================
    // Closure and preferences
    // =========================================================================

    /// Pay the full outstanding amount and clear the loan
    pub async fn close_early(&self, account_number: &str, transaction_pin: &str, context: &OperationContext) -> AppResult<LoanClosureResult> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        self.core.ensure_can_send(&account, context).await?;

        let outstanding = match &account.loan {
            Some(loan) => loan.total_due,
            None => return Err(DomainError::NoActiveLoan(number.to_string()).into()),
        };
        let amount = Amount::new(outstanding).map_err(DomainError::from)?;
        account.ensure_covers(&amount)?;
        self.core
            .check_transaction_pin(&mut account, transaction_pin, context)
            .await?;

        let now = Utc::now();
        let available = account.balance.value();
        account.loan = None;
        account.loan_last_paid_at = Some(now);
        account.last_activity = now;

        let record = TransactionRecord::new(
            TransactionType::LoanRepayment,
            Some(number.to_string()),
            None,
            amount,
            Some(LOAN_REPAYMENT_CATEGORY.to_string()),
            now,
        );
        let transaction_id = record.id.clone();

        let mut batch = WriteBatch::new()
            .debit(number, amount)
            .update_account(&account)
            .append(record);

        let approved = self
            .core
            .store()
            .loan_requests(Some(number), Some(LoanStatus::Approved))
            .await?;
        if let Some(mut request) = approved.into_iter().next() {
            request.advance(LoanStatus::Closed, &context.actor, None, now)?;
            batch = batch.push(WriteOp::SaveLoanRequest(request));
        }

        self.core
            .commit(batch)
            .await
            .map_err(|e| debit_error(e, amount.value(), available))?;

        let balance = available - amount.value();
        tracing::info!(account = %number, tx_id = %transaction_id, amount = %amount, "Loan closed early");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::LoanClosed)
                    .account(number)
                    .description(format!("Loan closed with payment of {amount} ({transaction_id})")),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "Loan closed",
                &format!("Your loan was closed with a payment of {amount}. Available balance: {balance:.2}"),
            )
            .await;

        Ok(LoanClosureResult {
            transaction_id,
            amount_paid: amount.value(),
            balance,
        })
    }

    /// Stored preference only; nothing repays automatically
    pub async fn set_auto_repayment(&self, account_number: &str, enabled: bool, context: &OperationContext) -> AppResult<()> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        if account.auto_repayment == enabled {
            return Ok(());
        }
        account.auto_repayment = enabled;
        self.core.commit(WriteBatch::new().update_account(&account)).await?;

        tracing::info!(account = %number, enabled, "Auto-repayment preference changed");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Approve when the balance and recent credits are both healthy
    pub async fn review_suggestion(&self, request_id: Uuid, context: &OperationContext) -> AppResult<ReviewSuggestion> {
        context.require_admin()?;
        let request = self.load_request(request_id).await?;
        let account = self.core.load_account(&request.account_number).await?;

        let recent_credits = self.recent_credits(&account).await?;
        let balance = account.balance.value();
        let recommendation = if balance > Decimal::from(REVIEW_MIN_BALANCE)
            && recent_credits > Decimal::from(REVIEW_MIN_CREDITS)
        {
            Recommendation::Approve
        } else {
            Recommendation::Reject
        };

        Ok(ReviewSuggestion {
            request_id,
            recommendation,
            balance,
            recent_credits,
        })
    }

    pub async fn status(&self, account_number: &str, context: &OperationContext) -> AppResult<LoanStatusView> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;

        let account = self.core.load_account(number).await?;
        let requests = self.core.store().loan_requests(Some(number), None).await?;

        Ok(LoanStatusView {
            account_number: account.account_number,
            loan: account.loan,
            auto_repayment: account.auto_repayment,
            last_paid_at: account.loan_last_paid_at,
            requests,
        })
    }

    pub async fn pending(&self, context: &OperationContext) -> AppResult<Vec<LoanRequest>> {
        context.require_admin()?;
        Ok(self.core.store().loan_requests(None, Some(LoanStatus::Pending)).await?)
    }

    async fn load_request(&self, request_id: Uuid) -> AppResult<LoanRequest> {
        self.core
            .store()
            .loan_request(request_id)
            .await?
            .ok_or_else(|| DomainError::LoanRequestNotFound(request_id).into())
    }

    /// DEPOSIT and incoming TRANSFER credits inside the review window
    async fn recent_credits(&self, account: &Account) -> AppResult<Decimal> {
        let now = Utc::now();
        let since = now
            .checked_sub_months(Months::new(REVIEW_WINDOW_MONTHS))
            .unwrap_or(now - Duration::days(182));
        let filter = TransactionFilter::for_account(&account.account_number)
            .with_status(TransactionStatus::Success)
            .between(Some(since), None)
            .page(REVIEW_SCAN_LIMIT, 0);

        let total: Decimal = self
            .core
            .store()
            .transactions(&filter)
            .await?
            .iter()
            .filter(|tx| matches!(tx.tx_type, TransactionType::Deposit | TransactionType::Transfer))
            .filter(|tx| tx.to_account.as_deref() == Some(account.account_number.as_str()))
            .map(|tx| tx.amount.value())
            .sum();
        Ok(total)
    }
}
