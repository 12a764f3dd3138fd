//! Transaction record
//!
//! Append-only money movement entries. Only the status (and the reversal
//! stamp) ever changes after insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Amount;

use super::UnknownValue;

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
    LoanCredit,
    LoanRepayment,
    Rollback,
    AccountClosed,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::LoanCredit => "LOAN_CREDIT",
            TransactionType::LoanRepayment => "LOAN_REPAYMENT",
            TransactionType::Rollback => "ROLLBACK",
            TransactionType::AccountClosed => "ACCOUNT_CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAW" => Some(TransactionType::Withdraw),
            "TRANSFER" => Some(TransactionType::Transfer),
            "LOAN_CREDIT" => Some(TransactionType::LoanCredit),
            "LOAN_REPAYMENT" => Some(TransactionType::LoanRepayment),
            "ROLLBACK" => Some(TransactionType::Rollback),
            "ACCOUNT_CLOSED" => Some(TransactionType::AccountClosed),
            _ => None,
        }
    }

    /// Whether a rollback knows how to reverse this type
    pub fn is_reversible(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit | TransactionType::Withdraw | TransactionType::Transfer
        )
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Reversed => "REVERSED",
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "SUCCESS" => Ok(TransactionStatus::Success),
            "REVERSED" => Ok(TransactionStatus::Reversed),
            _ => Err(UnknownValue::new("transaction status", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub tx_type: TransactionType,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Amount,
    pub category: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub rolled_back_by: Option<String>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// New SUCCESS record; a blank category falls back to "General"
    pub fn new(
        tx_type: TransactionType,
        from_account: Option<String>,
        to_account: Option<String>,
        amount: Amount,
        category: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Self {
            id: new_transaction_id(),
            tx_type,
            from_account,
            to_account,
            amount,
            category,
            status: TransactionStatus::Success,
            created_at,
            rolled_back_by: None,
            rolled_back_at: None,
        }
    }

    pub fn is_reversed(&self) -> bool {
        self.status == TransactionStatus::Reversed
    }

    /// Does this entry touch `account` on either side?
    pub fn touches(&self, account: &str) -> bool {
        self.from_account.as_deref() == Some(account) || self.to_account.as_deref() == Some(account)
    }
}

/// Opaque transaction ID: "TX" followed by 20 upper-case hex characters
pub fn new_transaction_id() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TX{}", &raw[..20])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let tx = TransactionRecord::new(
            TransactionType::Deposit,
            None,
            Some("12345678901".to_string()),
            Amount::from_integer(10).unwrap(),
            Some("   ".to_string()),
            Utc::now(),
        );
        assert_eq!(tx.category, DEFAULT_CATEGORY);
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.id.starts_with("TX"));
        assert_eq!(tx.id.len(), 22);
        assert!(tx.touches("12345678901"));
        assert!(!tx.touches("00000000000"));
    }

    #[test]
    fn test_reversible_types() {
        assert!(TransactionType::Transfer.is_reversible());
        assert!(!TransactionType::LoanCredit.is_reversible());
        assert_eq!(TransactionType::parse("loan_repayment"), Some(TransactionType::LoanRepayment));
        assert_eq!(TransactionType::parse("bogus"), None);
    }
}
