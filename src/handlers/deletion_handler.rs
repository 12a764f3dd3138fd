//! Deletion Request Handler
//!
//! Customer-filed closure requests reviewed by an admin. Approval is held
//! back while the account carries a loan.

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::model::{AccountStatus, DeletionRequest, DeletionStatus, Track};
use crate::store::{WriteBatch, WriteOp};

use super::{DeletionRequestCommand, LedgerCore};

pub struct DeletionHandler {
    core: LedgerCore,
}

impl DeletionHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    pub async fn submit(&self, command: DeletionRequestCommand, context: &OperationContext) -> AppResult<DeletionRequest> {
        let number = command.account_number.trim();
        self.core.authorize_account(context, number)?;
        let reason = command.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::invalid_field("reason", "is required").into());
        }

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        if account.deletion_requested {
            return Err(DomainError::DeletionAlreadyRequested(number.to_string()).into());
        }
        if !account.matches_ifsc(&command.ifsc) || !account.matches_contact(&command.contact) {
            tracing::warn!(account = %number, "Deletion request with mismatching identity details");
            return Err(DomainError::IdentityMismatch.into());
        }

        let request = DeletionRequest {
            id: Uuid::new_v4(),
            account_number: number.to_string(),
            requester_name: command.requester_name.trim().to_string(),
            contact: command.contact.trim().to_string(),
            ifsc: command.ifsc.trim().to_ascii_uppercase(),
            reason: reason.to_string(),
            status: DeletionStatus::Pending,
            admin_comment: None,
            processed_by: None,
            requested_at: Utc::now(),
            processed_at: None,
            had_loan: account.has_loan(),
        };
        account.deletion_requested = true;

        self.core
            .commit(
                WriteBatch::new()
                    .update_account(&account)
                    .push(WriteOp::SaveDeletionRequest(request.clone())),
            )
            .await?;

        tracing::info!(account = %number, request_id = %request.id, had_loan = request.had_loan, "Deletion requested");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::DeletionRequested)
                    .account(number)
                    .description(format!("Deletion requested ({}): {reason}", request.id)),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "Account deletion request received",
                "Your request to close your account is awaiting review.",
            )
            .await;

        Ok(request)
    }

    /// `Ok(false)` while the account still carries a loan; nothing changes.
    /// A request that is no longer PENDING fails with a state error first.
    pub async fn approve(&self, request_id: Uuid, comment: Option<String>, context: &OperationContext) -> AppResult<bool> {
        context.require_admin()?;
        let number = self.load(request_id).await?.account_number;

        let _guard = self.core.locks().lock(&number).await;
        let mut request = self.load(request_id).await?;
        let mut account = self.core.load_account(&number).await?;

        request.ensure_can_resolve(DeletionStatus::Approved)?;
        if account.has_loan() {
            tracing::warn!(account = %number, request_id = %request_id, "Deletion approval held back by active loan");
            return Ok(false);
        }

        let now = Utc::now();
        request.resolve(DeletionStatus::Approved, &context.actor, comment, now)?;
        account.status = AccountStatus::Deleted;
        account.is_deleted = true;
        account.deletion_requested = false;
        self.core.lockout().force_lock(&mut account, Track::Login, now);
        self.core.lockout().force_lock(&mut account, Track::Transaction, now);

        self.core
            .commit(
                WriteBatch::new()
                    .update_account(&account)
                    .push(WriteOp::SaveDeletionRequest(request)),
            )
            .await?;

        let revoked = self.core.sessions().revoke_account(&number);
        tracing::info!(account = %number, request_id = %request_id, sessions_revoked = revoked, "Deletion approved");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::DeletionApproved)
                    .account(&number)
                    .description(format!("Deletion request {request_id} approved")),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(&account.email, "Account closed", "Your account deletion request was approved.")
            .await;

        Ok(true)
    }

    /// Close the request; the account only loses its pending flag
    pub async fn reject(&self, request_id: Uuid, comment: &str, context: &OperationContext) -> AppResult<DeletionRequest> {
        context.require_admin()?;
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(DomainError::invalid_field("comment", "a reason is required when rejecting").into());
        }
        let number = self.load(request_id).await?.account_number;

        let _guard = self.core.locks().lock(&number).await;
        let mut request = self.load(request_id).await?;
        request.resolve(DeletionStatus::Rejected, &context.actor, Some(comment.to_string()), Utc::now())?;

        let mut batch = WriteBatch::new().push(WriteOp::SaveDeletionRequest(request.clone()));
        let account = self.core.store().account(&number).await?;
        if let Some(mut account) = account.clone() {
            account.deletion_requested = false;
            batch = batch.update_account(&account);
        }
        self.core.commit(batch).await?;

        tracing::info!(account = %number, request_id = %request_id, "Deletion rejected");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::DeletionRejected)
                    .account(&number)
                    .description(format!("Deletion request {request_id} rejected: {comment}")),
                context,
            )
            .await;
        if let Some(account) = account {
            self.core
                .notifier()
                .email(
                    &account.email,
                    "Account deletion request rejected",
                    &format!("Your account deletion request was rejected: {comment}"),
                )
                .await;
        }

        Ok(request)
    }

    /// Oldest first
    pub async fn pending(&self, context: &OperationContext) -> AppResult<Vec<DeletionRequest>> {
        context.require_admin()?;
        Ok(self.core.store().deletion_requests(Some(DeletionStatus::Pending)).await?)
    }

    pub async fn get(&self, request_id: Uuid, context: &OperationContext) -> AppResult<DeletionRequest> {
        context.require_admin()?;
        self.load(request_id).await
    }

    async fn load(&self, request_id: Uuid) -> AppResult<DeletionRequest> {
        self.core
            .store()
            .deletion_request(request_id)
            .await?
            .ok_or_else(|| DomainError::DeletionRequestNotFound(request_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;
    use crate::error::AppError;
    use crate::model::account::fixtures::account;
    use crate::model::LoanMetadata;
    use crate::domain::EmiPlan;
    use rust_decimal_macros::dec;

    fn command(account: &str) -> DeletionRequestCommand {
        DeletionRequestCommand {
            account_number: account.to_string(),
            requester_name: "Asha Rao".to_string(),
            contact: "asha@example.com".to_string(),
            ifsc: "astn00pun03".to_string(),
            reason: "Moving abroad".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_twice_conflicts() {
        let h = harness();
        h.seed(account("12345678901", dec!(100))).await;
        let handler = DeletionHandler::new(h.core.clone());
        let ctx = OperationContext::customer("12345678901");

        let request = handler.submit(command("12345678901"), &ctx).await.unwrap();
        assert_eq!(request.status, DeletionStatus::Pending);
        assert!(!request.had_loan);

        let err = handler.submit(command("12345678901"), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::DeletionAlreadyRequested(_))));
    }

    #[tokio::test]
    async fn test_approval_held_back_by_loan() {
        let h = harness();
        let mut acc = account("12345678901", dec!(100));
        acc.loan = Some(LoanMetadata {
            principal: dec!(4000),
            interest_rate: dec!(10),
            total_due: dec!(4400),
            loan_type: "Vehicle Loan".to_string(),
            emi_plan: EmiPlan::Monthly,
            taken_at: Utc::now(),
        });
        h.seed(acc).await;
        let handler = DeletionHandler::new(h.core.clone());
        let admin = OperationContext::admin("ops");

        let request = handler
            .submit(command("12345678901"), &OperationContext::customer("12345678901"))
            .await
            .unwrap();
        assert!(request.had_loan);

        assert!(!handler.approve(request.id, None, &admin).await.unwrap());
        assert_eq!(handler.get(request.id, &admin).await.unwrap().status, DeletionStatus::Pending);
        let stored = h.core.load_account("12345678901").await.unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_closed_request_on_loan_account_is_a_state_error() {
        let h = harness();
        let mut acc = account("12345678901", dec!(100));
        acc.loan = Some(LoanMetadata {
            principal: dec!(4000),
            interest_rate: dec!(10),
            total_due: dec!(4400),
            loan_type: "Vehicle Loan".to_string(),
            emi_plan: EmiPlan::Monthly,
            taken_at: Utc::now(),
        });
        h.seed(acc).await;
        let handler = DeletionHandler::new(h.core.clone());
        let admin = OperationContext::admin("ops");

        let request = handler
            .submit(command("12345678901"), &OperationContext::customer("12345678901"))
            .await
            .unwrap();
        handler.reject(request.id, "Loan outstanding", &admin).await.unwrap();

        let err = handler.approve(request.id, None, &admin).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::IllegalTransition { .. })));
        assert_eq!(err.error_code(), "state_error");
        assert_eq!(handler.get(request.id, &admin).await.unwrap().status, DeletionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_approve_deletes_and_locks() {
        let h = harness();
        h.seed(account("12345678901", dec!(100))).await;
        let handler = DeletionHandler::new(h.core.clone());
        let admin = OperationContext::admin("ops");

        let request = handler
            .submit(command("12345678901"), &OperationContext::customer("12345678901"))
            .await
            .unwrap();
        assert_eq!(handler.pending(&admin).await.unwrap().len(), 1);
        assert!(handler.approve(request.id, Some("done".into()), &admin).await.unwrap());

        let acc = h.core.load_account("12345678901").await.unwrap();
        assert!(acc.is_deleted);
        assert_eq!(acc.status, AccountStatus::Deleted);
        assert!(acc.login_track.is_locked() && acc.tx_track.is_locked());
        assert!(!acc.deletion_requested);
        assert!(handler.pending(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_requires_comment_and_clears_flag() {
        let h = harness();
        h.seed(account("12345678901", dec!(100))).await;
        let handler = DeletionHandler::new(h.core.clone());
        let admin = OperationContext::admin("ops");

        let request = handler
            .submit(command("12345678901"), &OperationContext::customer("12345678901"))
            .await
            .unwrap();
        assert!(handler.reject(request.id, "  ", &admin).await.is_err());

        let rejected = handler.reject(request.id, "Balance dispute open", &admin).await.unwrap();
        assert_eq!(rejected.status, DeletionStatus::Rejected);
        let acc = h.core.load_account("12345678901").await.unwrap();
        assert!(!acc.deletion_requested);
        assert_eq!(acc.status, AccountStatus::Active);
    }
}
