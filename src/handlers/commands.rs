//! Command definitions
//!
//! Commands carry caller input as received (amounts as strings for exact
//! decimal parsing); results describe what was committed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Outcome;
use crate::model::{AccountType, LoanMetadata, LoanRequest};

// =========================================================================
// Ledger
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_number: String,
    /// Amount (as string for precise decimal)
    pub amount: String,
    pub category: Option<String>,
    /// Client-supplied token folded into the duplicate-request key
    pub client_token: Option<String>,
}

impl DepositCommand {
    pub fn new(account_number: &str, amount: &str) -> Self {
        Self {
            account_number: account_number.to_string(),
            amount: amount.to_string(),
            category: None,
            client_token: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_client_token(mut self, token: &str) -> Self {
        self.client_token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub account_number: String,
    pub amount: String,
    #[serde(skip_serializing)]
    pub transaction_pin: String,
    pub category: Option<String>,
    pub client_token: Option<String>,
}

impl WithdrawCommand {
    pub fn new(account_number: &str, amount: &str, transaction_pin: &str) -> Self {
        Self {
            account_number: account_number.to_string(),
            amount: amount.to_string(),
            transaction_pin: transaction_pin.to_string(),
            category: None,
            client_token: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_client_token(mut self, token: &str) -> Self {
        self.client_token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
    /// IFSC the sender expects the recipient to hold
    pub expected_ifsc: String,
    #[serde(skip_serializing)]
    pub transaction_pin: String,
    pub category: Option<String>,
    pub client_token: Option<String>,
}

impl TransferCommand {
    pub fn new(from_account: &str, to_account: &str, amount: &str, expected_ifsc: &str, transaction_pin: &str) -> Self {
        Self {
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            amount: amount.to_string(),
            expected_ifsc: expected_ifsc.to_string(),
            transaction_pin: transaction_pin.to_string(),
            category: None,
            client_token: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_client_token(mut self, token: &str) -> Self {
        self.client_token = Some(token.to_string());
        self
    }
}

/// Result of a committed deposit, withdrawal or transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementResult {
    pub transaction_id: String,
    pub account_number: String,
    pub amount: Decimal,
    /// Balance of `account_number` after the movement
    pub balance: Decimal,
}

impl Outcome for MovementResult {
    fn message(&self) -> String {
        format!(
            "Transaction {} completed. Available balance: {:.2}",
            self.transaction_id, self.balance
        )
    }
}

// =========================================================================
// Loans
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub account_number: String,
    pub amount: String,
    pub loan_type: String,
    pub emi_plan: String,
    /// Government ID re-entered by the applicant
    pub gov_id_number: String,
    #[serde(skip_serializing)]
    pub transaction_pin: String,
    #[serde(skip)]
    pub kyc_proof: Vec<u8>,
}

impl LoanApplication {
    pub fn new(account_number: &str, amount: &str, loan_type: &str, emi_plan: &str) -> Self {
        Self {
            account_number: account_number.to_string(),
            amount: amount.to_string(),
            loan_type: loan_type.to_string(),
            emi_plan: emi_plan.to_string(),
            gov_id_number: String::new(),
            transaction_pin: String::new(),
            kyc_proof: Vec::new(),
        }
    }

    pub fn with_gov_id(mut self, gov_id_number: &str) -> Self {
        self.gov_id_number = gov_id_number.to_string();
        self
    }

    pub fn with_transaction_pin(mut self, pin: &str) -> Self {
        self.transaction_pin = pin.to_string();
        self
    }

    pub fn with_kyc_proof(mut self, proof: Vec<u8>) -> Self {
        self.kyc_proof = proof;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequestResult {
    pub request_id: Uuid,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub total_payable: Decimal,
}

impl Outcome for LoanRequestResult {
    fn message(&self) -> String {
        format!("Loan request {} submitted for review", self.request_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDecision {
    pub request: LoanRequest,
    /// LOAN_CREDIT transaction, on approval
    pub transaction_id: Option<String>,
}

impl Outcome for LoanDecision {
    fn message(&self) -> String {
        format!("Loan request {} is now {}", self.request.id, self.request.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanClosureResult {
    pub transaction_id: String,
    pub amount_paid: Decimal,
    pub balance: Decimal,
}

impl Outcome for LoanClosureResult {
    fn message(&self) -> String {
        format!("Loan closed with a payment of {:.2}", self.amount_paid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Reject,
}

/// Admin review aid for a pending loan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSuggestion {
    pub request_id: Uuid,
    pub recommendation: Recommendation,
    pub balance: Decimal,
    /// DEPOSIT and incoming TRANSFER credits inside the review window
    pub recent_credits: Decimal,
}

impl Outcome for ReviewSuggestion {
    fn message(&self) -> String {
        format!("Suggested decision: {:?}", self.recommendation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanStatusView {
    pub account_number: String,
    pub loan: Option<LoanMetadata>,
    pub auto_repayment: bool,
    pub last_paid_at: Option<DateTime<Utc>>,
    /// Newest first
    pub requests: Vec<LoanRequest>,
}

// =========================================================================
// Accounts
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub holder_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub gender: String,
    pub gov_id_type: String,
    pub gov_id_number: String,
    #[serde(skip)]
    pub gov_id_proof: Vec<u8>,
    pub branch: String,
    pub date_of_birth: NaiveDate,
    pub account_type: String,
    pub opening_deposit: String,
    #[serde(skip_serializing)]
    pub login_pin: String,
    /// Generated when absent
    #[serde(skip_serializing)]
    pub transaction_pin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountResult {
    pub account_number: String,
    pub ifsc: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    /// Shown once when the PIN was generated
    pub generated_transaction_pin: Option<String>,
}

impl Outcome for CreateAccountResult {
    fn message(&self) -> String {
        format!("Account {} created", self.account_number)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileCommand {
    pub account_number: String,
    pub holder_name: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftDeleteCommand {
    pub account_number: String,
    pub holder_name: String,
    pub ifsc: String,
    /// Email or phone on file
    pub contact: String,
    #[serde(skip_serializing)]
    pub transaction_pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequestCommand {
    pub account_number: String,
    pub requester_name: String,
    pub contact: String,
    pub ifsc: String,
    pub reason: String,
}

// =========================================================================
// Authentication
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PinKind {
    Login,
    Transaction,
}

impl PinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinKind::Login => "LOGIN",
            PinKind::Transaction => "TRANSACTION",
        }
    }
}

/// OTP challenge issued after a correct login PIN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginChallenge {
    pub account_number: String,
    pub expires_in_minutes: i64,
}

impl Outcome for LoginChallenge {
    fn message(&self) -> String {
        format!(
            "A one-time code was sent to your registered contacts, valid for {} minutes",
            self.expires_in_minutes
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinResetCompletion {
    pub account_number: String,
    pub kind: PinKind,
    pub otp: String,
    #[serde(skip_serializing)]
    pub new_pin: String,
}

// =========================================================================
// Administrators
// =========================================================================

/// OTP challenge issued after a correct admin password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginChallenge {
    pub username: String,
    pub expires_in_minutes: i64,
}

impl Outcome for AdminLoginChallenge {
    fn message(&self) -> String {
        format!(
            "A one-time code was sent to the admin's registered contacts, valid for {} minutes",
            self.expires_in_minutes
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdminCommand {
    pub holder_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_confirm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdminResult {
    pub username: String,
}

impl Outcome for CreateAdminResult {
    fn message(&self) -> String {
        format!("Admin {} created", self.username)
    }
}

/// At least one of `email` and `phone` must be present
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAdminContactCommand {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminPasswordResetCompletion {
    pub username: String,
    pub otp: String,
    #[serde(skip_serializing)]
    pub new_password: String,
}
