//! Account record
//!
//! The account row with its security tracks and loan metadata. Guard
//! methods here answer "may this happen?"; mutation of balances goes
//! through the store's conditional writes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::validation::{age_on, same_code};
use crate::domain::{Amount, Balance, DomainError, EmiPlan, Gender, GovIdType};

use super::UnknownValue;

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Deleted => "DELETED",
        }
    }
}

impl TryFrom<String> for AccountStatus {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "INACTIVE" => Ok(AccountStatus::Inactive),
            "DELETED" => Ok(AccountStatus::Deleted),
            _ => Err(UnknownValue::new("account status", s)),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Savings,
    Current,
    Student,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "SAVINGS",
            AccountType::Current => "CURRENT",
            AccountType::Student => "STUDENT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SAVINGS" => Ok(AccountType::Savings),
            "CURRENT" => Ok(AccountType::Current),
            "STUDENT" => Ok(AccountType::Student),
            _ => Err(DomainError::invalid_field("account type", "expected SAVINGS, CURRENT or STUDENT")),
        }
    }

    /// Smallest opening deposit accepted for this type
    pub fn minimum_opening_deposit(&self) -> Decimal {
        match self {
            AccountType::Student => Decimal::ZERO,
            _ => Decimal::from(1000),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two independent security tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Track {
    Login,
    Transaction,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Track::Login => f.write_str("Account login"),
            Track::Transaction => f.write_str("Transaction capability"),
        }
    }
}

/// State of one lockout track.
///
/// A locked track carries no counter: it stays locked until an explicit
/// reset, whatever is attempted in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockTrack {
    Unlocked { failures: u32 },
    Locked { since: DateTime<Utc> },
}

impl LockTrack {
    pub fn unlocked() -> Self {
        LockTrack::Unlocked { failures: 0 }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LockTrack::Locked { .. })
    }

    /// Consecutive failures so far (0 once locked)
    pub fn failures(&self) -> u32 {
        match self {
            LockTrack::Unlocked { failures } => *failures,
            LockTrack::Locked { .. } => 0,
        }
    }

    pub fn locked_since(&self) -> Option<DateTime<Utc>> {
        match self {
            LockTrack::Locked { since } => Some(*since),
            LockTrack::Unlocked { .. } => None,
        }
    }
}

impl Default for LockTrack {
    fn default() -> Self {
        Self::unlocked()
    }
}

/// Terms of the single outstanding loan on an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanMetadata {
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub total_due: Decimal,
    pub loan_type: String,
    pub emi_plan: EmiPlan,
    pub taken_at: DateTime<Utc>,
}

/// Customer account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub holder_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub gender: Gender,

    pub gov_id_type: GovIdType,
    pub gov_id_number: String,
    #[serde(skip)]
    pub gov_id_proof: Vec<u8>,
    pub branch: String,
    pub ifsc: String,
    pub date_of_birth: NaiveDate,

    pub account_type: AccountType,
    pub balance: Balance,

    /// Login PIN digest (or legacy plaintext awaiting migration)
    #[serde(skip)]
    pub login_secret: String,
    /// Transaction PIN digest
    #[serde(skip)]
    pub transaction_secret: String,
    pub login_track: LockTrack,
    pub tx_track: LockTrack,

    pub status: AccountStatus,
    pub deletion_requested: bool,
    pub is_deleted: bool,

    pub loan: Option<LoanMetadata>,
    pub loan_last_paid_at: Option<DateTime<Utc>>,
    pub auto_repayment: bool,

    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Account {
    pub fn track(&self, track: Track) -> LockTrack {
        match track {
            Track::Login => self.login_track,
            Track::Transaction => self.tx_track,
        }
    }

    pub fn track_mut(&mut self, track: Track) -> &mut LockTrack {
        match track {
            Track::Login => &mut self.login_track,
            Track::Transaction => &mut self.tx_track,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted || self.status == AccountStatus::Deleted
    }

    pub fn has_loan(&self) -> bool {
        self.loan.is_some()
    }

    pub fn age(&self, today: NaiveDate) -> u32 {
        age_on(self.date_of_birth, today).unwrap_or(0)
    }

    // =========================================================================
    // Guards
    // =========================================================================

    /// Fail if the account is in the terminal DELETED state
    pub fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::AccountDeleted(self.account_number.clone()));
        }
        Ok(())
    }

    /// Fail if money may not leave this account right now
    pub fn ensure_can_send(&self) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        if self.tx_track.is_locked() {
            return Err(DomainError::TrackLocked(Track::Transaction));
        }
        Ok(())
    }

    /// Fail if the balance does not cover `amount`
    pub fn ensure_covers(&self, amount: &Amount) -> Result<(), DomainError> {
        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(amount.value(), self.balance.value()));
        }
        Ok(())
    }

    /// Does `contact` match the email or phone on file?
    pub fn matches_contact(&self, contact: &str) -> bool {
        let contact = contact.trim();
        !contact.is_empty()
            && (self.email.eq_ignore_ascii_case(contact) || self.phone == contact)
    }

    pub fn matches_ifsc(&self, ifsc: &str) -> bool {
        same_code(&self.ifsc, ifsc)
    }

    pub fn matches_holder_name(&self, name: &str) -> bool {
        self.holder_name.trim().eq_ignore_ascii_case(name.trim())
    }

    pub fn matches_gov_id(&self, number: &str) -> bool {
        same_code(&self.gov_id_number, number)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::account;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_covers() {
        let acc = account("12345678901", dec!(5100));
        assert!(acc.ensure_covers(&Amount::from_integer(5100).unwrap()).is_ok());
        assert_eq!(
            acc.ensure_covers(&Amount::from_integer(6000).unwrap()),
            Err(DomainError::insufficient_funds(dec!(6000), dec!(5100)))
        );
    }

    #[test]
    fn test_ensure_can_send_respects_tx_lock() {
        let mut acc = account("12345678901", dec!(100));
        assert!(acc.ensure_can_send().is_ok());

        acc.tx_track = LockTrack::Locked { since: Utc::now() };
        assert_eq!(acc.ensure_can_send(), Err(DomainError::TrackLocked(Track::Transaction)));

        // Login lock does not gate money movement
        acc.tx_track = LockTrack::unlocked();
        acc.login_track = LockTrack::Locked { since: Utc::now() };
        assert!(acc.ensure_can_send().is_ok());
    }

    #[test]
    fn test_deleted_is_terminal_for_guards() {
        let mut acc = account("12345678901", dec!(100));
        acc.status = AccountStatus::Deleted;
        assert!(matches!(acc.ensure_not_deleted(), Err(DomainError::AccountDeleted(_))));
        assert!(acc.ensure_can_send().is_err());
    }

    #[test]
    fn test_matchers() {
        let acc = account("12345678901", dec!(0));
        assert!(acc.matches_contact("ASHA@example.com"));
        assert!(acc.matches_contact(" 9876543210 "));
        assert!(!acc.matches_contact(""));
        assert!(acc.matches_ifsc("astn00pun03"));
        assert!(acc.matches_holder_name(" asha rao "));
    }

    #[test]
    fn test_status_round_trip_from_db() {
        assert_eq!(AccountStatus::try_from("INACTIVE".to_string()), Ok(AccountStatus::Inactive));
        assert_eq!(AccountStatus::try_from("DELETED".to_string()), Ok(AccountStatus::Deleted));
        assert!(AccountStatus::try_from("CLOSED".to_string()).is_err());
        assert_eq!(AccountStatus::Deleted.to_string(), "DELETED");
    }

    #[test]
    fn test_minimum_opening_deposit() {
        assert_eq!(AccountType::Student.minimum_opening_deposit(), Decimal::ZERO);
        assert_eq!(AccountType::Current.minimum_opening_deposit(), dec!(1000));
    }
}
