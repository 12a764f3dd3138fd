//! Loan terms
//!
//! Fixed interest table and EMI plan arithmetic. Pure functions: the same
//! figures back the customer preview and the terms locked in at approval.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::round_money;
use super::{Amount, DomainError};

/// Repayment plan classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmiPlan {
    Monthly,
    Quarterly,
    Yearly,
}

impl EmiPlan {
    /// Number of instalments in one year
    pub fn instalments(&self) -> u32 {
        match self {
            EmiPlan::Monthly => 12,
            EmiPlan::Quarterly => 4,
            EmiPlan::Yearly => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmiPlan::Monthly => "MONTHLY",
            EmiPlan::Quarterly => "QUARTERLY",
            EmiPlan::Yearly => "YEARLY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(EmiPlan::Monthly),
            "QUARTERLY" => Ok(EmiPlan::Quarterly),
            "YEARLY" => Ok(EmiPlan::Yearly),
            _ => Err(DomainError::invalid_field("EMI plan", "expected MONTHLY, QUARTERLY or YEARLY")),
        }
    }
}

impl std::fmt::Display for EmiPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annual simple-interest rate (percent) for a loan type
pub fn interest_rate_for(loan_type: &str) -> Decimal {
    match loan_type.trim() {
        "Home Loan" => Decimal::new(80, 1),
        "Education Loan" => Decimal::new(65, 1),
        "Personal Loan" => Decimal::new(110, 1),
        _ => Decimal::new(100, 1),
    }
}

/// Non-binding repayment figures for a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmiQuote {
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub interest: Decimal,
    pub total_payable: Decimal,
    pub plan: EmiPlan,
    pub instalments: u32,
    pub instalment_amount: Decimal,
}

/// Compute the quote for `principal` on `loan_type` under `plan`
pub fn quote(principal: &Amount, loan_type: &str, plan: EmiPlan) -> EmiQuote {
    let rate = interest_rate_for(loan_type);
    let interest = principal.percent(rate);
    let total_payable = round_money(principal.value() + interest);
    let instalments = plan.instalments();
    let instalment_amount = round_money(total_payable / Decimal::from(instalments));

    EmiQuote {
        principal: principal.value(),
        interest_rate: rate,
        interest,
        total_payable,
        plan,
        instalments,
        instalment_amount,
    }
}

/// Total due under simple interest: principal + principal × rate / 100
pub fn total_due(principal: &Amount, rate: Decimal) -> Decimal {
    round_money(principal.value() + principal.percent(rate))
}

/// Minimum balance an applicant must hold: a quarter of the principal
pub fn minimum_maintained_balance(principal: &Amount) -> Decimal {
    round_money(principal.value() / Decimal::from(4))
}
