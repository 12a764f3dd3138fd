//! Authentication Handler
//!
//! Login (PIN then one-time code), transaction PIN checks, admin unlocks
//! and OTP-backed PIN resets. Admins log in the same way with a username
//! and password.

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::validation::{validate_password, validate_pin};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::model::{AccountStatus, Track};
use crate::security::{AttemptOutcome, Session, Verification};
use crate::store::WriteBatch;

use super::{
    admin_slot, AdminLoginChallenge, AdminPasswordResetCompletion, LedgerCore, LoginChallenge, PinKind,
    PinResetCompletion,
};

pub struct AuthHandler {
    core: LedgerCore,
}

impl AuthHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Check the login PIN; on success a one-time code goes to the
    /// registered email and phone
    pub async fn login(&self, account_number: &str, pin: &str, context: &OperationContext) -> AppResult<LoginChallenge> {
        let number = account_number.trim();
        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        let track = Track::Login;
        let had_failures = account.login_track.failures() > 0;
        let verification = if self.core.lockout().is_locked(&account, track) {
            Verification::Invalid
        } else {
            self.core.credentials().verify(pin, &account.login_secret)
        };
        let now = Utc::now();
        let outcome = self.core.lockout().attempt(&mut account, track, verification.is_valid(), now);

        match outcome {
            AttemptOutcome::AlreadyLocked => {
                tracing::warn!(account = %number, "Login attempt on locked account");
                self.audit(AuditAction::LoginFailed, number, "Login attempted while locked", context)
                    .await;
            }
            AttemptOutcome::Rejected { remaining } => {
                self.core.commit(WriteBatch::new().update_account(&account)).await?;
                tracing::warn!(account = %number, remaining, "Wrong login PIN");
                self.audit(
                    AuditAction::LoginFailed,
                    number,
                    &format!("Wrong login PIN, {remaining} attempts left"),
                    context,
                )
                .await;
            }
            AttemptOutcome::LockedNow => {
                self.core.commit(WriteBatch::new().update_account(&account)).await?;
                tracing::warn!(account = %number, "Account login locked");
                self.audit(AuditAction::LoginFailed, number, "Wrong login PIN", context).await;
                self.audit(
                    AuditAction::LockAccount,
                    number,
                    "Login locked after repeated failures",
                    context,
                )
                .await;
                self.core
                    .notifier()
                    .email(
                        &account.email,
                        "Account locked",
                        "Your account login was locked after repeated wrong PIN entries. Contact your branch to unlock it.",
                    )
                    .await;
            }
            AttemptOutcome::Accepted => {
                let mut dirty = had_failures;
                if verification.needs_migration() {
                    account.login_secret = self.core.credentials().hash(pin)?;
                    dirty = true;
                }
                if account.status == AccountStatus::Inactive {
                    account.status = AccountStatus::Active;
                    dirty = true;
                }
                if dirty {
                    account.last_activity = now;
                    self.core.commit(WriteBatch::new().update_account(&account)).await?;
                }

                self.audit(AuditAction::LoginSuccess, number, "Login PIN verified", context)
                    .await;
                let code = self.core.otp().issue(number);
                let minutes = self.core.policy().otp_expiry_minutes;
                let text = format!("Your one-time login code is {code}. It expires in {minutes} minutes.");
                self.core.notifier().email(&account.email, "Your login code", &text).await;
                self.core.notifier().sms(&account.phone, &text).await;
                tracing::info!(account = %number, "Login code issued");
            }
        }

        outcome.into_result(track)?;
        Ok(LoginChallenge {
            account_number: number.to_string(),
            expires_in_minutes: self.core.policy().otp_expiry_minutes,
        })
    }

    /// Second factor; opens a session bound to the account
    pub fn complete_login(&self, account_number: &str, code: &str) -> AppResult<Session> {
        let number = account_number.trim();
        if !self.core.otp().verify(number, code.trim()) {
            tracing::warn!(account = %number, "Rejected login code");
            return Err(DomainError::InvalidOtp.into());
        }
        let session = self.core.sessions().open_customer(number);
        tracing::info!(account = %number, session_id = %session.id, "Session opened");
        Ok(session)
    }

    pub fn logout(&self, session_id: Uuid) -> bool {
        self.core.sessions().close(session_id)
    }

    /// Standalone transaction PIN check against the lockout track
    pub async fn verify_tx_pin(&self, account_number: &str, pin: &str, context: &OperationContext) -> AppResult<()> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;
        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        self.core.check_transaction_pin(&mut account, pin, context).await
    }

    // =========================================================================
    // Admin unlock
    // =========================================================================

    pub async fn unlock(&self, account_number: &str, context: &OperationContext) -> AppResult<()> {
        self.unlock_track(account_number, Track::Login, context).await
    }

    pub async fn unlock_tx(&self, account_number: &str, context: &OperationContext) -> AppResult<()> {
        self.unlock_track(account_number, Track::Transaction, context).await
    }

    async fn unlock_track(&self, account_number: &str, track: Track, context: &OperationContext) -> AppResult<()> {
        context.require_admin()?;
        let number = account_number.trim();

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        self.core.lockout().reset(&mut account, track);
        self.core.commit(WriteBatch::new().update_account(&account)).await?;

        let action = match track {
            Track::Login => AuditAction::UnlockAccount,
            Track::Transaction => AuditAction::UnlockTx,
        };
        tracing::info!(account = %number, track = %track, actor = %context.actor, "Track unlocked");
        self.audit(action, number, &format!("{track} unlocked by {}", context.actor), context)
            .await;
        self.core
            .notifier()
            .email(&account.email, "Access restored", &format!("{track} has been unlocked."))
            .await;
        Ok(())
    }

    // =========================================================================
    // PIN reset
    // =========================================================================

    /// Issue a reset code when `contact` matches the email or phone on file
    pub async fn request_pin_reset(
        &self,
        account_number: &str,
        contact: &str,
        kind: PinKind,
        context: &OperationContext,
    ) -> AppResult<()> {
        let number = account_number.trim();
        let account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        if !account.matches_contact(contact) {
            tracing::warn!(account = %number, kind = kind.as_str(), "PIN reset with unknown contact");
            return Err(DomainError::IdentityMismatch.into());
        }

        let code = self.core.otp().issue(&reset_identifier(number, kind));
        let text = format!(
            "Your {} PIN reset code is {code}. It expires in {} minutes.",
            kind.as_str().to_ascii_lowercase(),
            self.core.policy().otp_expiry_minutes
        );
        self.core.notifier().email(&account.email, "PIN reset code", &text).await;
        self.core.notifier().sms(&account.phone, &text).await;
        tracing::info!(account = %number, kind = kind.as_str(), actor = %context.actor, "PIN reset code issued");
        Ok(())
    }

    /// Store the new PIN and clear the matching lockout track
    pub async fn complete_pin_reset(&self, completion: PinResetCompletion, context: &OperationContext) -> AppResult<()> {
        let number = completion.account_number.trim();
        validate_pin(&completion.new_pin)?;
        if !self
            .core
            .otp()
            .verify(&reset_identifier(number, completion.kind), completion.otp.trim())
        {
            tracing::warn!(account = %number, "Rejected PIN reset code");
            return Err(DomainError::InvalidOtp.into());
        }

        let _guard = self.core.locks().lock(number).await;
        let mut account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;

        let digest = self.core.credentials().hash(&completion.new_pin)?;
        let (track, action) = match completion.kind {
            PinKind::Login => {
                account.login_secret = digest;
                (Track::Login, AuditAction::PinReset)
            }
            PinKind::Transaction => {
                account.transaction_secret = digest;
                (Track::Transaction, AuditAction::TxPinReset)
            }
        };
        self.core.lockout().reset(&mut account, track);
        self.core.commit(WriteBatch::new().update_account(&account)).await?;

        tracing::info!(account = %number, kind = completion.kind.as_str(), "PIN reset");
        self.audit(action, number, &format!("{} PIN reset via one-time code", completion.kind.as_str()), context)
            .await;
        self.core
            .notifier()
            .email(
                &account.email,
                "PIN changed",
                "Your PIN was changed. If this was not you, contact your branch immediately.",
            )
            .await;
        Ok(())
    }

    // =========================================================================
    // Admin login
    // =========================================================================

    /// Check the admin password; on success a one-time code goes to the
    /// admin's email and phone
    pub async fn admin_login(
        &self,
        username: &str,
        password: &str,
        context: &OperationContext,
    ) -> AppResult<AdminLoginChallenge> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DomainError::invalid_field("username", "required").into());
        }
        if password.is_empty() {
            return Err(DomainError::invalid_field("password", "required").into());
        }

        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let mut admin = self.core.load_admin(username).await?;
        let name = admin.username.clone();

        let had_failures = admin.login_track.failures() > 0;
        let verification = if admin.login_track.is_locked() {
            Verification::Invalid
        } else {
            self.core.credentials().verify(password, &admin.password_hash)
        };
        let outcome = self
            .core
            .lockout()
            .apply(&mut admin.login_track, verification.is_valid(), Utc::now());

        match outcome {
            AttemptOutcome::AlreadyLocked => {
                tracing::warn!(admin = %name, "Login attempt on locked admin");
                self.audit_admin(AuditAction::LoginFailed, &format!("Admin {name} login attempted while locked"), context)
                    .await;
            }
            AttemptOutcome::Rejected { remaining } => {
                self.core.commit(WriteBatch::new().update_admin(&admin)).await?;
                tracing::warn!(admin = %name, remaining, "Wrong admin password");
                self.audit_admin(
                    AuditAction::LoginFailed,
                    &format!("Wrong password for admin {name}, {remaining} attempts left"),
                    context,
                )
                .await;
            }
            AttemptOutcome::LockedNow => {
                self.core.commit(WriteBatch::new().update_admin(&admin)).await?;
                tracing::warn!(admin = %name, "Admin login locked");
                self.audit_admin(AuditAction::LoginFailed, &format!("Wrong password for admin {name}"), context)
                    .await;
                self.audit_admin(
                    AuditAction::LockAccount,
                    &format!("Admin {name} locked after repeated failures"),
                    context,
                )
                .await;
                self.core
                    .notifier()
                    .email(
                        &admin.email,
                        "Admin login locked",
                        "Your admin login was locked after repeated wrong passwords. Ask another administrator to unlock it.",
                    )
                    .await;
            }
            AttemptOutcome::Accepted => {
                let mut dirty = had_failures;
                if verification.needs_migration() {
                    admin.password_hash = self.core.credentials().hash(password)?;
                    dirty = true;
                }
                if dirty {
                    self.core.commit(WriteBatch::new().update_admin(&admin)).await?;
                }

                self.audit_admin(AuditAction::LoginSuccess, &format!("Admin {name} password verified"), context)
                    .await;
                let code = self.core.otp().issue(&admin_login_identifier(&name));
                let minutes = self.core.policy().otp_expiry_minutes;
                let text = format!("Your one-time admin login code is {code}. It expires in {minutes} minutes.");
                self.core.notifier().email(&admin.email, "Your admin login code", &text).await;
                self.core.notifier().sms(&admin.phone, &text).await;
                tracing::info!(admin = %name, "Admin login code issued");
            }
        }

        outcome.into_result(Track::Login)?;
        Ok(AdminLoginChallenge {
            username: name,
            expires_in_minutes: self.core.policy().otp_expiry_minutes,
        })
    }

    /// Second factor for admins; stamps the last login and opens an admin
    /// session
    pub async fn complete_admin_login(&self, username: &str, code: &str) -> AppResult<Session> {
        let username = username.trim();
        if !self.core.otp().verify(&admin_login_identifier(username), code.trim()) {
            tracing::warn!(admin = %username, "Rejected admin login code");
            return Err(DomainError::InvalidOtp.into());
        }

        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let mut admin = self.core.load_admin(username).await?;
        admin.last_login_at = Some(Utc::now());
        self.core.commit(WriteBatch::new().update_admin(&admin)).await?;

        let session = self.core.sessions().open_admin(&admin.username);
        tracing::info!(admin = %admin.username, session_id = %session.id, "Admin session opened");
        Ok(session)
    }

    pub async fn unlock_admin(&self, username: &str, context: &OperationContext) -> AppResult<()> {
        context.require_admin()?;
        let username = username.trim();

        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let mut admin = self.core.load_admin(username).await?;
        self.core.lockout().clear(&mut admin.login_track);
        self.core.commit(WriteBatch::new().update_admin(&admin)).await?;

        tracing::info!(admin = %admin.username, actor = %context.actor, "Admin unlocked");
        self.audit_admin(
            AuditAction::UnlockAccount,
            &format!("Admin {} unlocked by {}", admin.username, context.actor),
            context,
        )
        .await;
        self.core
            .notifier()
            .email(&admin.email, "Access restored", "Your admin login has been unlocked.")
            .await;
        Ok(())
    }

    /// Issue a password reset code when `contact` matches the admin's
    /// email or phone
    pub async fn request_admin_password_reset(
        &self,
        username: &str,
        contact: &str,
        context: &OperationContext,
    ) -> AppResult<()> {
        let username = username.trim();
        let admin = self.core.load_admin(username).await?;
        let contact = contact.trim();
        if !(admin.email.eq_ignore_ascii_case(contact) || admin.phone == contact) {
            tracing::warn!(admin = %username, "Admin password reset with unknown contact");
            return Err(DomainError::IdentityMismatch.into());
        }

        let code = self.core.otp().issue(&admin_reset_identifier(&admin.username));
        let text = format!(
            "Your admin password reset code is {code}. It expires in {} minutes.",
            self.core.policy().otp_expiry_minutes
        );
        self.core.notifier().email(&admin.email, "Password reset code", &text).await;
        self.core.notifier().sms(&admin.phone, &text).await;
        tracing::info!(admin = %admin.username, actor = %context.actor, "Admin password reset code issued");
        Ok(())
    }

    /// Store the new password, clear the lockout and end open sessions
    pub async fn complete_admin_password_reset(
        &self,
        completion: AdminPasswordResetCompletion,
        context: &OperationContext,
    ) -> AppResult<()> {
        let username = completion.username.trim();
        validate_password(&completion.new_password)?;
        if !self
            .core
            .otp()
            .verify(&admin_reset_identifier(username), completion.otp.trim())
        {
            tracing::warn!(admin = %username, "Rejected admin password reset code");
            return Err(DomainError::InvalidOtp.into());
        }

        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let mut admin = self.core.load_admin(username).await?;
        admin.password_hash = self.core.credentials().hash(&completion.new_password)?;
        self.core.lockout().clear(&mut admin.login_track);
        self.core.commit(WriteBatch::new().update_admin(&admin)).await?;
        let revoked = self.core.sessions().revoke_admin(&admin.username);

        tracing::info!(admin = %admin.username, revoked, "Admin password reset");
        self.audit_admin(
            AuditAction::PasswordReset,
            &format!("Admin {} password reset via one-time code", admin.username),
            context,
        )
        .await;
        self.core
            .notifier()
            .email(
                &admin.email,
                "Password changed",
                "Your admin password was changed. If this was not you, contact the bank immediately.",
            )
            .await;
        Ok(())
    }

    async fn audit_admin(&self, action: AuditAction, description: &str, context: &OperationContext) {
        self.core
            .audit()
            .record(AuditLogBuilder::new(action).description(description), context)
            .await;
    }

    async fn audit(&self, action: AuditAction, account: &str, description: &str, context: &OperationContext) {
        self.core
            .audit()
            .record(
                AuditLogBuilder::new(action).account(account).description(description),
                context,
            )
            .await;
    }
}

fn reset_identifier(account_number: &str, kind: PinKind) -> String {
    format!("{account_number}:reset:{}", kind.as_str())
}

fn admin_login_identifier(username: &str) -> String {
    admin_slot(username)
}

fn admin_reset_identifier(username: &str) -> String {
    format!("{}:reset", admin_slot(username))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, Harness};
    use super::*;
    use crate::error::AppError;
    use crate::model::account::fixtures::account;
    use rust_decimal_macros::dec;

    /// Last 6-digit code delivered to `recipient`
    fn last_code(h: &Harness, recipient: &str) -> String {
        h.gateway
            .sent_to(recipient)
            .last()
            .and_then(|m| {
                m.text()
                    .split(|c: char| !c.is_ascii_digit())
                    .find(|w| w.len() == 6)
                    .map(str::to_string)
            })
            .expect("no code delivered")
    }

    #[tokio::test]
    async fn test_login_with_otp() {
        let h = harness();
        let mut acc = account("12345678901", dec!(0));
        acc.status = AccountStatus::Inactive;
        h.seed(acc).await;
        let auth = AuthHandler::new(h.core.clone());

        auth.login("12345678901", "1111", &OperationContext::system()).await.unwrap();
        let code = last_code(&h, "9876543210");

        assert!(auth.complete_login("12345678901", "000000x").is_err());
        let session = auth.complete_login("12345678901", &code).unwrap();
        assert_eq!(session.account_number.as_deref(), Some("12345678901"));
        // One-time use
        assert!(auth.complete_login("12345678901", &code).is_err());

        let stored = h.core.load_account("12345678901").await.unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
        assert!(crate::security::credential::is_digest(&stored.login_secret));
        assert!(auth.logout(session.id));
    }

    #[tokio::test]
    async fn test_login_lockout_and_admin_unlock() {
        let h = harness();
        h.seed(account("12345678901", dec!(0))).await;
        let auth = AuthHandler::new(h.core.clone());
        let ctx = OperationContext::system();

        let err = auth.login("12345678901", "0000", &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidCredential { remaining_attempts: 2 })
        ));
        auth.login("12345678901", "0000", &ctx).await.unwrap_err();
        auth.login("12345678901", "0000", &ctx).await.unwrap_err();

        let err = auth.login("12345678901", "1111", &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::TrackLocked(Track::Login))));
        assert_eq!(h.audit.count(AuditAction::LockAccount), 1);

        assert!(auth.unlock("12345678901", &ctx).await.is_err());
        auth.unlock("12345678901", &OperationContext::admin("ops")).await.unwrap();
        auth.login("12345678901", "1111", &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_pin_reset() {
        let h = harness();
        let mut acc = account("12345678901", dec!(0));
        acc.tx_track = crate::model::LockTrack::Locked { since: Utc::now() };
        h.seed(acc).await;
        let auth = AuthHandler::new(h.core.clone());
        let ctx = OperationContext::system();

        let err = auth
            .request_pin_reset("12345678901", "nobody@example.com", PinKind::Transaction, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::IdentityMismatch)));

        auth.request_pin_reset("12345678901", "asha@example.com", PinKind::Transaction, &ctx)
            .await
            .unwrap();
        let code = last_code(&h, "asha@example.com");

        auth.complete_pin_reset(
            PinResetCompletion {
                account_number: "12345678901".to_string(),
                kind: PinKind::Transaction,
                otp: code,
                new_pin: "8642".to_string(),
            },
            &ctx,
        )
        .await
        .unwrap();

        let customer = OperationContext::customer("12345678901");
        auth.verify_tx_pin("12345678901", "8642", &customer).await.unwrap();
        assert!(auth.verify_tx_pin("12345678901", "2222", &customer).await.is_err());
        assert_eq!(h.audit.count(AuditAction::TxPinReset), 1);
    }

    #[tokio::test]
    async fn test_admin_login_with_otp() {
        let h = harness();
        h.seed_admin("ravishankar", "ravi-pass").await;
        let auth = AuthHandler::new(h.core.clone());
        let ctx = OperationContext::system();

        let err = auth.admin_login("", "ravi-pass", &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidField { field: "username", .. })));
        let err = auth.admin_login("nobody", "ravi-pass", &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminNotFound(_))));

        let challenge = auth.admin_login("RaviShankar", "ravi-pass", &ctx).await.unwrap();
        assert_eq!(challenge.username, "ravishankar");
        let code = last_code(&h, "ravishankar@bank.test");
        assert_eq!(h.gateway.sent_to("9876543210").len(), 1);

        assert!(auth.complete_admin_login("ravishankar", "000000").await.is_err());
        let session = auth.complete_admin_login("ravishankar", &code).await.unwrap();
        assert!(session.context().is_admin());
        assert_eq!(session.actor, "ravishankar");

        let stored = h.core.load_admin("ravishankar").await.unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_admin_lockout_and_unlock() {
        let h = harness();
        h.seed_admin("ravishankar", "ravi-pass").await;
        let auth = AuthHandler::new(h.core.clone());
        let ctx = OperationContext::system();

        let err = auth.admin_login("ravishankar", "wrong-pass", &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidCredential { remaining_attempts: 2 })
        ));
        auth.admin_login("ravishankar", "wrong-pass", &ctx).await.unwrap_err();
        auth.admin_login("ravishankar", "wrong-pass", &ctx).await.unwrap_err();

        let err = auth.admin_login("ravishankar", "ravi-pass", &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::TrackLocked(Track::Login))));
        assert_eq!(h.audit.count(AuditAction::LockAccount), 1);
        assert!(h.core.load_admin("ravishankar").await.unwrap().login_track.is_locked());

        let customer = OperationContext::customer("12345678901");
        assert!(auth.unlock_admin("ravishankar", &customer).await.is_err());
        auth.unlock_admin("ravishankar", &OperationContext::admin("admin")).await.unwrap();
        auth.admin_login("ravishankar", "ravi-pass", &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_password_reset() {
        let h = harness();
        h.seed_admin("ravishankar", "ravi-pass").await;
        let auth = AuthHandler::new(h.core.clone());
        let ctx = OperationContext::system();
        let open = h.core.sessions().open_admin("ravishankar");

        let err = auth
            .request_admin_password_reset("ravishankar", "someone@else.test", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::IdentityMismatch)));

        auth.request_admin_password_reset("ravishankar", "9876543210", &ctx)
            .await
            .unwrap();
        let code = last_code(&h, "9876543210");

        let short = AdminPasswordResetCompletion {
            username: "ravishankar".to_string(),
            otp: code.clone(),
            new_password: "abc".to_string(),
        };
        assert!(auth.complete_admin_password_reset(short, &ctx).await.is_err());

        auth.complete_admin_password_reset(
            AdminPasswordResetCompletion {
                username: "ravishankar".to_string(),
                otp: code,
                new_password: "fresh-pass".to_string(),
            },
            &ctx,
        )
        .await
        .unwrap();

        assert!(h.core.sessions().get(open.id).is_none());
        assert_eq!(h.audit.count(AuditAction::PasswordReset), 1);
        assert!(auth.admin_login("ravishankar", "ravi-pass", &ctx).await.is_err());
        auth.admin_login("ravishankar", "fresh-pass", &ctx).await.unwrap();
    }
}
