//! Operation Context
//!
//! Who is calling, in what role, and through which session. Carried into
//! every handler for authorization checks, audit and tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
            Role::System => "SYSTEM",
        }
    }
}

/// Context for an operation, used for authorization, auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Actor name recorded in audit entries (account number or admin username)
    pub actor: String,

    pub role: Role,

    /// Account the caller's session is bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_account: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    /// Context for a logged-in customer bound to `account_number`
    pub fn customer(account_number: impl Into<String>) -> Self {
        let account_number = account_number.into();
        Self {
            actor: account_number.clone(),
            role: Role::Customer,
            session_account: Some(account_number),
            session_id: None,
            correlation_id: None,
        }
    }

    /// Context for an administrator
    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            actor: username.into(),
            role: Role::Admin,
            session_account: None,
            session_id: None,
            correlation_id: None,
        }
    }

    /// Context for internal callers (jobs, unauthenticated flows)
    pub fn system() -> Self {
        Self {
            actor: "SYSTEM".to_string(),
            role: Role::System,
            session_account: None,
            session_id: None,
            correlation_id: None,
        }
    }

    /// Attach a session ID
    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach a correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail unless the caller is an administrator
    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::AdminRequired)
        }
    }

    /// Fail unless the caller is the system itself (jobs, internal flows)
    pub fn require_system(&self) -> Result<(), DomainError> {
        match self.role {
            Role::System => Ok(()),
            _ => Err(DomainError::InternalCallerRequired),
        }
    }

    /// Fail unless the caller's session is bound to `account_number`
    pub fn require_session_for(&self, account_number: &str) -> Result<(), DomainError> {
        match self.session_account.as_deref() {
            Some(bound) if bound == account_number => Ok(()),
            _ => Err(DomainError::SessionMismatch(account_number.to_string())),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_context() {
        let session = Uuid::new_v4();
        let ctx = OperationContext::customer("12345678901").with_session(session);

        assert_eq!(ctx.actor, "12345678901");
        assert_eq!(ctx.session_id, Some(session));
        assert!(ctx.require_session_for("12345678901").is_ok());
        assert_eq!(
            ctx.require_session_for("99999999999"),
            Err(DomainError::SessionMismatch("99999999999".to_string()))
        );
        assert_eq!(ctx.require_admin(), Err(DomainError::AdminRequired));
        assert_eq!(ctx.require_system(), Err(DomainError::InternalCallerRequired));
    }

    #[test]
    fn test_admin_context_has_no_session_account() {
        let ctx = OperationContext::admin("root");
        assert!(ctx.require_admin().is_ok());
        assert!(ctx.require_system().is_err());
        assert!(OperationContext::system().require_system().is_ok());
        assert!(ctx.require_session_for("12345678901").is_err());
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::system();
        let id = context.ensure_correlation_id();
        assert_eq!(context.ensure_correlation_id(), id);
    }
}
