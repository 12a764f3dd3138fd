//! Error handling module
//!
//! Centralized error type for handlers and its conversion to the
//! success-flag-plus-message response callers receive.

use serde::Serialize;

use crate::audit::AuditError;
use crate::domain::DomainError;
use crate::report::ReportError;
use crate::security::CredentialError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// Stable snake_case code for callers
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => e.kind().as_str(),
            AppError::Store(e) => match e {
                StoreError::InsufficientBalance(_) => "insufficient_funds",
                StoreError::AlreadyReversed(_) | StoreError::Duplicate(_) => "conflict",
                StoreError::NotFound { .. } => "not_found",
                StoreError::BalanceLimit(_) => "validation_error",
                StoreError::Corrupt(_) | StoreError::Database(_) => "internal_error",
            },
            AppError::Credential(CredentialError::EmptySecret) => "validation_error",
            AppError::Credential(_) => "internal_error",
            AppError::Report(_) => "internal_error",
            AppError::Audit(_) | AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// Failure the core cannot recover from locally
    pub fn is_infrastructure(&self) -> bool {
        self.error_code() == "internal_error" || self.error_code() == "config_error"
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

// =========================================================================
// Caller-facing response
// =========================================================================

/// Successful handler results describe themselves
pub trait Outcome {
    fn message(&self) -> String;

    /// `false` for "completed but nothing applied" results
    fn succeeded(&self) -> bool {
        true
    }
}

impl Outcome for bool {
    fn message(&self) -> String {
        if *self {
            "Operation completed".to_string()
        } else {
            "Operation was not applied".to_string()
        }
    }

    fn succeeded(&self) -> bool {
        *self
    }
}

impl Outcome for () {
    fn message(&self) -> String {
        "Operation completed".to_string()
    }
}

/// Success flag plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn failed(error: &AppError) -> Self {
        let message = if error.is_infrastructure() {
            tracing::error!(error = ?error, "Operation failed on infrastructure error");
            "The operation could not be completed, please try again later".to_string()
        } else {
            error.to_string()
        };

        Self {
            success: false,
            message,
            error_code: Some(error.error_code().to_string()),
        }
    }
}

impl<T: Outcome> From<&AppResult<T>> for OperationResponse {
    fn from(result: &AppResult<T>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: outcome.succeeded(),
                message: outcome.message(),
                error_code: None,
            },
            Err(e) => Self::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;
    use rust_decimal_macros::dec;

    #[test]
    fn test_domain_codes() {
        let err = AppError::from(DomainError::insufficient_funds(dec!(6000), dec!(5100)));
        assert_eq!(err.error_code(), "insufficient_funds");

        let err = AppError::from(DomainError::TrackLocked(Track::Login));
        assert_eq!(err.error_code(), "authorization_error");
    }

    #[test]
    fn test_infrastructure_message_is_generic() {
        let result: AppResult<()> = Err(StoreError::Database(sqlx::Error::PoolTimedOut).into());
        let response = OperationResponse::from(&result);

        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("internal_error"));
        assert!(!response.message.contains("pool"));
    }

    #[test]
    fn test_false_outcome_is_not_success() {
        let result: AppResult<bool> = Ok(false);
        let response = OperationResponse::from(&result);
        assert!(!response.success);
        assert!(response.error_code.is_none());
    }

    #[test]
    fn test_balance_ceiling_is_a_validation_failure() {
        let err = AppError::from(StoreError::BalanceLimit("12345678901".to_string()));
        assert_eq!(err.error_code(), "validation_error");
        assert!(!err.is_infrastructure());
    }
}
