//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::handlers::{AdminBootstrap, LedgerPolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    pub otp_expiry_minutes: i64,

    /// Duplicate-request window in milliseconds
    pub dedupe_window_ms: i64,

    /// Failed attempts before a track locks
    pub lockout_threshold: u32,

    /// Smallest withdrawal or transfer
    pub min_debit_amount: Decimal,

    pub inactivity_months: u32,

    /// Maintenance job period
    pub job_interval_secs: u64,

    /// "json" or "text"
    pub log_format: String,

    /// Seeds the default admin on an empty table when set
    pub admin_bootstrap_password: Option<String>,
    pub admin_email: String,
    pub admin_phone: String,
}

fn var_or<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let config = Self {
            database_url,
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", "10")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            otp_expiry_minutes: var_or("OTP_EXPIRY_MINUTES", "5")?,
            dedupe_window_ms: var_or("DEDUPE_WINDOW_MS", "3000")?,
            lockout_threshold: var_or("LOCKOUT_THRESHOLD", "3")?,
            min_debit_amount: var_or("MIN_DEBIT_AMOUNT", "100")?,
            inactivity_months: var_or("INACTIVITY_MONTHS", "6")?,
            job_interval_secs: var_or("JOB_INTERVAL_SECS", "60")?,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            admin_bootstrap_password: env::var("ADMIN_BOOTSTRAP_PASSWORD")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@bank.com".to_string()),
            admin_phone: env::var("ADMIN_PHONE").unwrap_or_else(|_| "9999999999".to_string()),
        };

        if config.lockout_threshold == 0 {
            return Err(ConfigError::InvalidValue("LOCKOUT_THRESHOLD"));
        }
        if config.min_debit_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue("MIN_DEBIT_AMOUNT"));
        }
        if config.job_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("JOB_INTERVAL_SECS"));
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Business knobs handed to the handlers
    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            min_debit: self.min_debit_amount,
            lockout_threshold: self.lockout_threshold,
            otp_expiry_minutes: self.otp_expiry_minutes,
            dedupe_window_ms: self.dedupe_window_ms,
            inactivity_months: self.inactivity_months,
        }
    }

    /// Default admin seed, when a bootstrap password is configured
    pub fn admin_bootstrap(&self) -> Option<AdminBootstrap> {
        self.admin_bootstrap_password.as_ref().map(|password| AdminBootstrap {
            password: password.clone(),
            email: self.admin_email.clone(),
            phone: self.admin_phone.clone(),
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_policy_from_config() {
        let config = Config {
            database_url: "postgres://localhost/bank".to_string(),
            database_max_connections: 10,
            environment: "production".to_string(),
            otp_expiry_minutes: 5,
            dedupe_window_ms: 3000,
            lockout_threshold: 3,
            min_debit_amount: dec!(100),
            inactivity_months: 6,
            job_interval_secs: 60,
            log_format: "JSON".to_string(),
            admin_bootstrap_password: None,
            admin_email: "admin@bank.com".to_string(),
            admin_phone: "9999999999".to_string(),
        };

        let policy = config.policy();
        assert_eq!(policy.min_debit, dec!(100));
        assert_eq!(policy.lockout_threshold, 3);
        assert!(config.is_production());
        assert!(config.json_logs());
        assert!(config.admin_bootstrap().is_none());

        let seeded = Config {
            admin_bootstrap_password: Some("admin123".to_string()),
            ..config
        };
        let bootstrap = seeded.admin_bootstrap().unwrap();
        assert_eq!(bootstrap.email, "admin@bank.com");
        assert_eq!(bootstrap.password, "admin123");
    }
}
