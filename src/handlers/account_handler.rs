//! Account Handler
//!
//! Opening, profile changes, customer soft delete, admin restore and
//! admin hard delete.

use std::str::FromStr;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use rust_decimal::Decimal;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::validation::{
    age_on, ifsc_for_branch, validate_address, validate_email, validate_holder_name, validate_phone,
    validate_pin,
};
use crate::domain::{round_money, Amount, Balance, DomainError, Gender, GovIdType, OperationContext};
use crate::error::{AppError, AppResult};
use crate::model::{
    Account, AccountStatus, AccountType, LockTrack, TransactionRecord, TransactionType, Track,
};
use crate::store::{StoreError, WriteBatch, WriteOp};

use super::{CreateAccountCommand, CreateAccountResult, LedgerCore, SoftDeleteCommand, UpdateProfileCommand};

/// Age below which an account must be STUDENT
const ADULT_AGE: u32 = 18;
const ACCOUNT_NUMBER_ATTEMPTS: usize = 16;
const OPENING_DEPOSIT_CATEGORY: &str = "Opening Deposit";
const CLOSURE_CATEGORY: &str = "Account Closure";

pub struct AccountHandler {
    core: LedgerCore,
}

impl AccountHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    // =========================================================================
    // Opening
    // =========================================================================

    pub async fn create(&self, command: CreateAccountCommand, context: &OperationContext) -> AppResult<CreateAccountResult> {
        let holder_name = command.holder_name.trim().to_string();
        validate_holder_name(&holder_name)?;
        let email = command.email.trim().to_string();
        validate_email(&email)?;
        let phone = command.phone.trim().to_string();
        validate_phone(&phone)?;
        validate_address(&command.address)?;
        let gender = Gender::parse(&command.gender)?;

        let gov_id_type = GovIdType::parse(&command.gov_id_type)?;
        let gov_id_number = command.gov_id_number.trim().to_ascii_uppercase();
        gov_id_type.validate_number(&gov_id_number)?;
        if command.gov_id_proof.is_empty() {
            return Err(DomainError::invalid_field("government ID proof", "document is required").into());
        }

        let ifsc = ifsc_for_branch(&command.branch)?;
        let age = age_on(command.date_of_birth, Utc::now().date_naive())?;
        let mut account_type = AccountType::parse(&command.account_type)?;
        if age < ADULT_AGE && account_type != AccountType::Student {
            tracing::info!(age, requested = %account_type, "Minor applicant, opening STUDENT account");
            account_type = AccountType::Student;
        }

        let opening = parse_opening_deposit(&command.opening_deposit)?;
        let minimum = account_type.minimum_opening_deposit();
        if opening < minimum {
            return Err(DomainError::BelowMinimum {
                minimum,
                requested: opening,
            }
            .into());
        }

        validate_pin(&command.login_pin)?;
        let (transaction_pin, generated) = match command.transaction_pin.as_deref() {
            Some(pin) => {
                validate_pin(pin)?;
                (pin.to_string(), None)
            }
            None => {
                let pin = format!("{:04}", OsRng.gen_range(0..10_000u32));
                (pin.clone(), Some(pin))
            }
        };

        if self.core.store().account_by_gov_id(&gov_id_number).await?.is_some() {
            return Err(DomainError::DuplicateGovernmentId.into());
        }

        let login_secret = self.core.credentials().hash(&command.login_pin)?;
        let transaction_secret = self.core.credentials().hash(&transaction_pin)?;
        let now = Utc::now();

        let mut account = Account {
            account_number: String::new(),
            holder_name,
            email,
            phone,
            address: command.address.trim().to_string(),
            gender,
            gov_id_type,
            gov_id_number,
            gov_id_proof: command.gov_id_proof,
            branch: command.branch.trim().to_string(),
            ifsc: ifsc.to_string(),
            date_of_birth: command.date_of_birth,
            account_type,
            balance: Balance::zero(),
            login_secret,
            transaction_secret,
            login_track: LockTrack::unlocked(),
            tx_track: LockTrack::unlocked(),
            status: AccountStatus::Active,
            deletion_requested: false,
            is_deleted: false,
            loan: None,
            loan_last_paid_at: None,
            auto_repayment: false,
            created_at: now,
            last_activity: now,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            account.account_number = self.unused_account_number().await?;

            let mut batch = WriteBatch::new().push(WriteOp::InsertAccount(account.clone()));
            if opening > Decimal::ZERO {
                let amount = Amount::new(opening).map_err(DomainError::from)?;
                batch = batch.credit(&account.account_number, amount).append(TransactionRecord::new(
                    TransactionType::Deposit,
                    None,
                    Some(account.account_number.clone()),
                    amount,
                    Some(OPENING_DEPOSIT_CATEGORY.to_string()),
                    now,
                ));
            }

            match self.core.commit(batch).await {
                Ok(()) => break,
                Err(AppError::Store(StoreError::Duplicate(what))) if what.contains("gov") => {
                    return Err(DomainError::DuplicateGovernmentId.into());
                }
                Err(AppError::Store(StoreError::Duplicate(_))) if attempts < ACCOUNT_NUMBER_ATTEMPTS => {
                    tracing::debug!("Account number taken concurrently, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        let number = account.account_number.clone();
        tracing::info!(account = %number, account_type = %account_type, "Account created");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::CreateAccount)
                    .account(&number)
                    .description(format!("{account_type} account opened with {opening:.2}")),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "Welcome to your new account",
                &format!(
                    "Dear {}, your {account_type} account {number} (IFSC {ifsc}) is now open.",
                    account.holder_name
                ),
            )
            .await;

        Ok(CreateAccountResult {
            account_number: number,
            ifsc: ifsc.to_string(),
            account_type,
            balance: opening,
            generated_transaction_pin: generated,
        })
    }

    async fn unused_account_number(&self) -> AppResult<String> {
        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let candidate = OsRng.gen_range(10_000_000_000u64..100_000_000_000).to_string();
            if self.core.store().account(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(AppError::Internal("could not allocate an account number".to_string()))
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub async fn update_contact(
        &self,
        account_number: &str,
        email: Option<&str>,
        phone: Option<&str>,
        context: &OperationContext,
    ) -> AppResult<()> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;
        if let Some(email) = email {
            validate_email(email.trim())?;
        }
        if let Some(phone) = phone {
            validate_phone(phone.trim())?;
        }

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        let mut changed = Vec::new();
        if let Some(email) = email {
            account.email = email.trim().to_string();
            changed.push("email");
        }
        if let Some(phone) = phone {
            account.phone = phone.trim().to_string();
            changed.push("phone");
        }
        if changed.is_empty() {
            return Ok(());
        }

        self.core.commit(WriteBatch::new().update_account(&account)).await?;
        self.record_profile_change(number, &changed, context).await;
        Ok(())
    }

    pub async fn update_profile(&self, command: UpdateProfileCommand, context: &OperationContext) -> AppResult<()> {
        let number = command.account_number.trim();
        self.core.authorize_account(context, number)?;

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        let mut changed = Vec::new();
        if let Some(name) = command.holder_name.as_deref() {
            validate_holder_name(name.trim())?;
            account.holder_name = name.trim().to_string();
            changed.push("holder name");
        }
        if let Some(address) = command.address.as_deref() {
            validate_address(address)?;
            account.address = address.trim().to_string();
            changed.push("address");
        }
        if let Some(gender) = command.gender.as_deref() {
            account.gender = Gender::parse(gender)?;
            changed.push("gender");
        }
        if let Some(account_type) = command.account_type.as_deref() {
            let next = AccountType::parse(account_type)?;
            if next != AccountType::Student && account.age(Utc::now().date_naive()) < ADULT_AGE {
                return Err(DomainError::invalid_field("account type", "must stay STUDENT while under 18").into());
            }
            account.account_type = next;
            changed.push("account type");
        }
        if changed.is_empty() {
            return Ok(());
        }

        self.core.commit(WriteBatch::new().update_account(&account)).await?;
        self.record_profile_change(number, &changed, context).await;
        Ok(())
    }

    async fn record_profile_change(&self, number: &str, changed: &[&str], context: &OperationContext) {
        tracing::info!(account = %number, fields = ?changed, "Profile updated");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::ProfileUpdated)
                    .account(number)
                    .description(format!("Updated {}", changed.join(", "))),
                context,
            )
            .await;
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Customer self-service close; reversible only by an admin restore
    pub async fn soft_delete(&self, command: SoftDeleteCommand, context: &OperationContext) -> AppResult<()> {
        let number = command.account_number.trim();
        context.require_session_for(number)?;

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        if account.has_loan() {
            return Err(DomainError::ActiveLoan(number.to_string()).into());
        }

        if !account.matches_holder_name(&command.holder_name)
            || !account.matches_ifsc(&command.ifsc)
            || !account.matches_contact(&command.contact)
        {
            tracing::warn!(account = %number, "Soft delete with mismatching identity details");
            return Err(DomainError::IdentityMismatch.into());
        }
        self.core
            .check_transaction_pin(&mut account, &command.transaction_pin, context)
            .await?;

        let now = Utc::now();
        account.status = AccountStatus::Deleted;
        account.is_deleted = true;
        self.core.lockout().force_lock(&mut account, Track::Login, now);
        self.core.lockout().force_lock(&mut account, Track::Transaction, now);
        account.last_activity = now;
        self.core.commit(WriteBatch::new().update_account(&account)).await?;

        let revoked = self.core.sessions().revoke_account(number);
        tracing::info!(account = %number, sessions_revoked = revoked, "Account soft deleted");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::AccountSoftDeleted)
                    .account(number)
                    .description("Account closed by the holder"),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(&account.email, "Account closed", "Your account was closed at your request.")
            .await;
        Ok(())
    }

    pub async fn restore(&self, account_number: &str, context: &OperationContext) -> AppResult<()> {
        context.require_admin()?;
        let number = account_number.trim();

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;

        account.status = AccountStatus::Active;
        account.is_deleted = false;
        account.deletion_requested = false;
        self.core.lockout().reset(&mut account, Track::Login);
        self.core.lockout().reset(&mut account, Track::Transaction);
        account.last_activity = Utc::now();
        self.core.commit(WriteBatch::new().update_account(&account)).await?;

        tracing::info!(account = %number, actor = %context.actor, "Account restored");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::AccountRestored)
                    .account(number)
                    .description("Account restored to ACTIVE"),
                context,
            )
            .await;
        self.core
            .notifier()
            .email(&account.email, "Account restored", "Your account is active again.")
            .await;
        Ok(())
    }

    /// Remove the account row; its transactions stay in the log
    pub async fn hard_delete(&self, account_number: &str, context: &OperationContext) -> AppResult<()> {
        context.require_admin()?;
        let number = account_number.trim();

        let _guard = self.core.locks().lock(number).await;
        let account = self.core.load_account(number).await?;
        if account.has_loan() {
            return Err(DomainError::ActiveLoan(number.to_string()).into());
        }

        let mut batch = WriteBatch::new();
        let remaining = account.balance.value();
        if remaining > Decimal::ZERO {
            let amount = Amount::new(remaining).map_err(DomainError::from)?;
            batch = batch.debit(number, amount).append(TransactionRecord::new(
                TransactionType::AccountClosed,
                Some(number.to_string()),
                None,
                amount,
                Some(CLOSURE_CATEGORY.to_string()),
                Utc::now(),
            ));
        }
        batch = batch.push(WriteOp::DeleteAccount(number.to_string()));
        self.core.commit(batch).await?;

        self.core.sessions().revoke_account(number);
        tracing::info!(account = %number, paid_out = %remaining, actor = %context.actor, "Account deleted");
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(AuditAction::DeleteAccount)
                    .account(number)
                    .description(format!("Account removed, {remaining:.2} paid out")),
                context,
            )
            .await;
        Ok(())
    }
}

/// Opening deposits may be zero, unlike movement amounts
fn parse_opening_deposit(raw: &str) -> Result<Decimal, DomainError> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|_| DomainError::InvalidAmount(format!("'{}' is not a number", raw.trim())))?;
    if value < Decimal::ZERO {
        return Err(DomainError::InvalidAmount("opening deposit cannot be negative".to_string()));
    }
    Ok(round_money(value))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;
    use crate::model::account::fixtures::account;
    use crate::store::TransactionFilter;
    use chrono::{Datelike, NaiveDate};
    use rust_decimal_macros::dec;

    fn command(gov_id: &str, account_type: &str, deposit: &str) -> CreateAccountCommand {
        CreateAccountCommand {
            holder_name: "Ravi Kumar".to_string(),
            email: "ravi@example.com".to_string(),
            phone: "9123456780".to_string(),
            address: "4 Brigade Road".to_string(),
            gender: "male".to_string(),
            gov_id_type: "PAN".to_string(),
            gov_id_number: gov_id.to_string(),
            gov_id_proof: vec![7, 7, 7],
            branch: "bangalore".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 6, 15).unwrap(),
            account_type: account_type.to_string(),
            opening_deposit: deposit.to_string(),
            login_pin: "1357".to_string(),
            transaction_pin: None,
        }
    }

    #[tokio::test]
    async fn test_create_records_opening_deposit() {
        let h = harness();
        let handler = AccountHandler::new(h.core.clone());

        let result = handler
            .create(command("ABCDE1234F", "savings", "1500"), &OperationContext::system())
            .await
            .unwrap();

        assert_eq!(result.account_number.len(), 11);
        assert_eq!(result.ifsc, "ASTN00BLR02");
        assert_eq!(result.generated_transaction_pin.as_ref().map(|p| p.len()), Some(4));
        assert_eq!(h.balance(&result.account_number).await, dec!(1500));

        let txs = h
            .core
            .store()
            .transactions(&TransactionFilter::for_account(&result.account_number))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].category, "Opening Deposit");
        assert_eq!(h.audit.count(AuditAction::CreateAccount), 1);
        assert_eq!(h.gateway.sent_to("ravi@example.com").len(), 1);

        let stored = h.core.load_account(&result.account_number).await.unwrap();
        assert!(crate::security::credential::is_digest(&stored.login_secret));
    }

    #[tokio::test]
    async fn test_create_rules() {
        let h = harness();
        let handler = AccountHandler::new(h.core.clone());
        let ctx = OperationContext::system();

        let err = handler.create(command("ABCDE1234F", "CURRENT", "999.99"), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::BelowMinimum { .. })));

        handler.create(command("ABCDE1234F", "SAVINGS", "1000"), &ctx).await.unwrap();
        let err = handler.create(command("abcde1234f", "SAVINGS", "1000"), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::DuplicateGovernmentId)));

        let mut bad_branch = command("ZZZZZ1234Z", "SAVINGS", "1000");
        bad_branch.branch = "Chennai".to_string();
        assert!(handler.create(bad_branch, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_minor_forced_to_student() {
        let h = harness();
        let handler = AccountHandler::new(h.core.clone());
        let today = Utc::now().date_naive();
        let mut cmd = command("QWERT1234Y", "SAVINGS", "0");
        cmd.date_of_birth = NaiveDate::from_ymd_opt(today.year() - 12, 1, 1).unwrap();

        let result = handler.create(cmd, &OperationContext::system()).await.unwrap();
        assert_eq!(result.account_type, AccountType::Student);

        let err = handler
            .update_profile(
                UpdateProfileCommand {
                    account_number: result.account_number.clone(),
                    account_type: Some("SAVINGS".to_string()),
                    ..Default::default()
                },
                &OperationContext::admin("ops"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let h = harness();
        h.seed(account("12345678901", dec!(800))).await;
        let handler = AccountHandler::new(h.core.clone());
        let session = h.core.sessions().open_customer("12345678901");
        let ctx = session.context();

        let mut cmd = SoftDeleteCommand {
            account_number: "12345678901".to_string(),
            holder_name: "asha rao".to_string(),
            ifsc: "ASTN00PUN03".to_string(),
            contact: "someone@else.com".to_string(),
            transaction_pin: "2222".to_string(),
        };
        let err = handler.soft_delete(cmd.clone(), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::IdentityMismatch)));

        cmd.contact = "9876543210".to_string();
        handler.soft_delete(cmd, &ctx).await.unwrap();

        let acc = h.core.load_account("12345678901").await.unwrap();
        assert_eq!(acc.status, AccountStatus::Deleted);
        assert!(acc.login_track.is_locked() && acc.tx_track.is_locked());
        assert!(h.core.sessions().get(session.id).is_none());

        handler.restore("12345678901", &OperationContext::admin("ops")).await.unwrap();
        let acc = h.core.load_account("12345678901").await.unwrap();
        assert_eq!(acc.status, AccountStatus::Active);
        assert!(!acc.login_track.is_locked() && !acc.tx_track.is_locked());
    }

    #[tokio::test]
    async fn test_hard_delete_pays_out_balance() {
        let h = harness();
        h.seed(account("12345678901", dec!(250))).await;
        let handler = AccountHandler::new(h.core.clone());

        let err = handler
            .hard_delete("12345678901", &OperationContext::customer("12345678901"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminRequired)));

        handler.hard_delete("12345678901", &OperationContext::admin("ops")).await.unwrap();
        assert!(h.core.store().account("12345678901").await.unwrap().is_none());

        let txs = h
            .core
            .store()
            .transactions(&TransactionFilter::for_account("12345678901"))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_type, TransactionType::AccountClosed);
    }

    #[tokio::test]
    async fn test_update_contact() {
        let h = harness();
        h.seed(account("12345678901", dec!(0))).await;
        let handler = AccountHandler::new(h.core.clone());
        let ctx = OperationContext::customer("12345678901");

        assert!(handler.update_contact("12345678901", Some("not-an-email"), None, &ctx).await.is_err());
        handler
            .update_contact("12345678901", Some("asha.rao@example.org"), Some("9000000001"), &ctx)
            .await
            .unwrap();

        let acc = h.core.load_account("12345678901").await.unwrap();
        assert_eq!(acc.email, "asha.rao@example.org");
        assert_eq!(acc.phone, "9000000001");
        assert_eq!(h.audit.count(AuditAction::ProfileUpdated), 1);
    }

    #[test]
    fn test_parse_opening_deposit() {
        assert_eq!(parse_opening_deposit(" 0 ").unwrap(), Decimal::ZERO);
        assert_eq!(parse_opening_deposit("1000.005").unwrap(), dec!(1000.00));
        assert!(parse_opening_deposit("-1").is_err());
        assert!(parse_opening_deposit("ten").is_err());
    }
}
