//! Admin Handler
//!
//! Management of administrator logins. Any admin may create, list and
//! delete admins; only the default admin edits contact details. The
//! default admin itself can never be deleted.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::validation::{validate_email, validate_holder_name, validate_password, validate_phone};
use crate::domain::{DomainError, OperationContext};
use crate::error::{AppError, AppResult};
use crate::model::admin::{is_default_admin, username_base, username_candidates, DEFAULT_ADMIN};
use crate::model::{AdminUser, LockTrack};
use crate::store::{StoreError, WriteBatch, WriteOp};

use super::{admin_slot, CreateAdminCommand, CreateAdminResult, LedgerCore, UpdateAdminContactCommand};

/// Seed values for the default admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrap {
    #[serde(skip_serializing)]
    pub password: String,
    pub email: String,
    pub phone: String,
}

pub struct AdminHandler {
    core: LedgerCore,
}

impl AdminHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self { core }
    }

    /// Create the default admin when it does not exist yet.
    ///
    /// Returns `true` when a row was written.
    pub async fn bootstrap_default(&self, seed: &AdminBootstrap) -> AppResult<bool> {
        let _guard = self.core.locks().lock(&admin_slot(DEFAULT_ADMIN)).await;
        if self.core.store().admin(DEFAULT_ADMIN).await?.is_some() {
            return Ok(false);
        }

        let admin = AdminUser {
            username: DEFAULT_ADMIN.to_string(),
            holder_name: "Administrator".to_string(),
            email: seed.email.trim().to_string(),
            phone: seed.phone.trim().to_string(),
            password_hash: self.core.credentials().hash(&seed.password)?,
            login_track: LockTrack::unlocked(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        match self.core.commit(WriteBatch::new().push(WriteOp::InsertAdmin(admin))).await {
            Ok(()) => {}
            // Another process seeded it first
            Err(AppError::Store(StoreError::Duplicate(_))) => return Ok(false),
            Err(e) => return Err(e),
        }

        self.audit(AuditAction::AdminCreated, "Default admin seeded", &OperationContext::system())
            .await;
        Ok(true)
    }

    /// New admin; the username is the lowercased holder name without
    /// spaces, suffixed with the first free number on collision
    pub async fn create(&self, command: CreateAdminCommand, context: &OperationContext) -> AppResult<CreateAdminResult> {
        context.require_admin()?;
        let holder_name = command.holder_name.trim();
        validate_holder_name(holder_name)?;
        validate_email(&command.email)?;
        validate_phone(&command.phone)?;
        validate_password(&command.password)?;
        if command.password != command.password_confirm {
            return Err(DomainError::invalid_field("password_confirm", "does not match password").into());
        }

        let base = username_base(holder_name);
        let mut username = None;
        // The default admin's name is reserved for bootstrap
        for candidate in username_candidates(&base).filter(|c| !is_default_admin(c)) {
            if self.core.store().admin(&candidate).await?.is_none() {
                username = Some(candidate);
                break;
            }
        }
        let Some(username) = username else {
            return Err(DomainError::invalid_field("holder name", "no free username").into());
        };

        let admin = AdminUser {
            username: username.clone(),
            holder_name: holder_name.to_string(),
            email: command.email.trim().to_string(),
            phone: command.phone.trim().to_string(),
            password_hash: self.core.credentials().hash(&command.password)?,
            login_track: LockTrack::unlocked(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.core.commit(WriteBatch::new().push(WriteOp::InsertAdmin(admin))).await?;

        tracing::info!(admin = %username, actor = %context.actor, "Admin created");
        self.audit(
            AuditAction::AdminCreated,
            &format!("Admin {username} created by {}", context.actor),
            context,
        )
        .await;
        Ok(CreateAdminResult { username })
    }

    pub async fn list(&self, context: &OperationContext) -> AppResult<Vec<AdminUser>> {
        context.require_admin()?;
        Ok(self.core.store().admins().await?)
    }

    /// Change email and/or phone; only the default admin may do this
    pub async fn update_contact(&self, command: UpdateAdminContactCommand, context: &OperationContext) -> AppResult<AdminUser> {
        context.require_admin()?;
        if !is_default_admin(&context.actor) {
            return Err(DomainError::DefaultAdminRequired.into());
        }

        let email = command.email.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let phone = command.phone.as_deref().map(str::trim).filter(|v| !v.is_empty());
        if email.is_none() && phone.is_none() {
            return Err(DomainError::invalid_field("contact", "email or phone is required").into());
        }
        if let Some(email) = email {
            validate_email(email)?;
        }
        if let Some(phone) = phone {
            validate_phone(phone)?;
        }

        let username = command.username.trim();
        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let mut admin = self.core.load_admin(username).await?;
        if let Some(email) = email {
            admin.email = email.to_string();
        }
        if let Some(phone) = phone {
            admin.phone = phone.to_string();
        }
        self.core.commit(WriteBatch::new().update_admin(&admin)).await?;

        tracing::info!(admin = %admin.username, "Admin contact updated");
        self.audit(
            AuditAction::AdminUpdated,
            &format!("Contact details of admin {} updated", admin.username),
            context,
        )
        .await;
        Ok(admin)
    }

    /// Remove an admin and end their sessions
    pub async fn delete(&self, username: &str, context: &OperationContext) -> AppResult<()> {
        context.require_admin()?;
        let username = username.trim();
        if is_default_admin(username) {
            return Err(DomainError::ProtectedAdmin(DEFAULT_ADMIN.to_string()).into());
        }
        if context.actor.eq_ignore_ascii_case(username) {
            return Err(DomainError::SelfDeletion.into());
        }

        let _guard = self.core.locks().lock(&admin_slot(username)).await;
        let admin = self.core.load_admin(username).await?;
        self.core
            .commit(WriteBatch::new().push(WriteOp::DeleteAdmin(admin.username.clone())))
            .await?;
        let revoked = self.core.sessions().revoke_admin(&admin.username);

        tracing::info!(admin = %admin.username, revoked, actor = %context.actor, "Admin deleted");
        self.audit(
            AuditAction::AdminDeleted,
            &format!("Admin {} deleted by {}", admin.username, context.actor),
            context,
        )
        .await;
        Ok(())
    }

    async fn audit(&self, action: AuditAction, description: &str, context: &OperationContext) {
        self.core
            .audit()
            .record(AuditLogBuilder::new(action).description(description), context)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;

    fn create_command(holder_name: &str) -> CreateAdminCommand {
        CreateAdminCommand {
            holder_name: holder_name.to_string(),
            email: "ops@bank.test".to_string(),
            phone: "9123456780".to_string(),
            password: "ops-pass".to_string(),
            password_confirm: "ops-pass".to_string(),
        }
    }

    fn seed() -> AdminBootstrap {
        AdminBootstrap {
            password: "admin123".to_string(),
            email: "admin@bank.com".to_string(),
            phone: "9999999999".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let h = harness();
        let admins = AdminHandler::new(h.core.clone());

        assert!(admins.bootstrap_default(&seed()).await.unwrap());
        assert!(!admins.bootstrap_default(&seed()).await.unwrap());

        let root = h.core.load_admin("admin").await.unwrap();
        assert!(root.is_default());
        assert_eq!(root.email, "admin@bank.com");
        assert!(crate::security::credential::is_digest(&root.password_hash));
        assert_eq!(h.audit.count(AuditAction::AdminCreated), 1);
    }

    #[tokio::test]
    async fn test_create_assigns_free_username() {
        let h = harness();
        h.seed_admin("ravishankar", "ravi-pass").await;
        let admins = AdminHandler::new(h.core.clone());
        let ctx = OperationContext::admin("admin");

        let created = admins.create(create_command("Ravi Shankar"), &ctx).await.unwrap();
        assert_eq!(created.username, "ravishankar1");
        let again = admins.create(create_command("ravi  shankar"), &ctx).await.unwrap();
        assert_eq!(again.username, "ravishankar2");
        let reserved = admins.create(create_command("Admin"), &ctx).await.unwrap();
        assert_eq!(reserved.username, "admin1");

        let listed: Vec<String> = admins
            .list(&ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(listed, vec!["admin1", "ravishankar", "ravishankar1", "ravishankar2"]);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let h = harness();
        let admins = AdminHandler::new(h.core.clone());

        let err = admins
            .create(create_command("Meera Nair"), &OperationContext::customer("12345678901"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminRequired)));

        let mut mismatched = create_command("Meera Nair");
        mismatched.password_confirm = "other-pass".to_string();
        let err = admins
            .create(mismatched, &OperationContext::admin("admin"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidField { field: "password_confirm", .. })
        ));
        assert!(h.core.store().admins().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_default_admin_updates_contacts() {
        let h = harness();
        h.seed_admin("admin", "admin123").await;
        h.seed_admin("meeranair", "meera-pass").await;
        let admins = AdminHandler::new(h.core.clone());

        let command = UpdateAdminContactCommand {
            username: "meeranair".to_string(),
            email: Some("meera@bank.test".to_string()),
            phone: None,
        };
        let err = admins
            .update_contact(command.clone(), &OperationContext::admin("meeranair"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::DefaultAdminRequired)));

        let empty = UpdateAdminContactCommand {
            username: "meeranair".to_string(),
            email: Some("  ".to_string()),
            phone: None,
        };
        assert!(admins.update_contact(empty, &OperationContext::admin("admin")).await.is_err());

        let updated = admins
            .update_contact(command, &OperationContext::admin("Admin"))
            .await
            .unwrap();
        assert_eq!(updated.email, "meera@bank.test");
        assert_eq!(updated.phone, "9876543210");

        let missing = UpdateAdminContactCommand {
            username: "ghost".to_string(),
            email: None,
            phone: Some("9000000000".to_string()),
        };
        let err = admins
            .update_contact(missing, &OperationContext::admin("admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let h = harness();
        h.seed_admin("admin", "admin123").await;
        h.seed_admin("meeranair", "meera-pass").await;
        let admins = AdminHandler::new(h.core.clone());
        let meera = OperationContext::admin("meeranair");
        let session = h.core.sessions().open_admin("meeranair");

        let err = admins.delete("ADMIN", &meera).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::ProtectedAdmin(_))));
        assert_eq!(err.error_code(), "state_error");

        let err = admins.delete("meeranair", &meera).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::SelfDeletion)));

        let root = OperationContext::admin("admin");
        let err = admins.delete("ghost", &root).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AdminNotFound(_))));

        admins.delete("meeranair", &root).await.unwrap();
        assert!(h.core.store().admin("meeranair").await.unwrap().is_none());
        assert!(h.core.sessions().get(session.id).is_none());
        assert_eq!(h.audit.count(AuditAction::AdminDeleted), 1);
    }
}
