//! Loan and deletion requests
//!
//! Review workflows with closed state machines. `advance` is the only way
//! a status changes, so an illegal transition cannot be written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, DomainError, EmiPlan};

use super::UnknownValue;

// =========================================================================
// LoanRequest
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Closed => "CLOSED",
        }
    }

    /// PENDING → APPROVED | REJECTED, APPROVED → CLOSED; nothing else
    pub fn can_become(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved)
                | (LoanStatus::Pending, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Closed)
    }
}

impl TryFrom<String> for LoanStatus {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "PENDING" => Ok(LoanStatus::Pending),
            "APPROVED" => Ok(LoanStatus::Approved),
            "REJECTED" => Ok(LoanStatus::Rejected),
            "CLOSED" => Ok(LoanStatus::Closed),
            _ => Err(UnknownValue::new("loan status", s)),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequest {
    pub id: Uuid,
    pub account_number: String,
    pub amount: Amount,
    pub interest_rate: Decimal,
    pub loan_type: String,
    pub emi_plan: EmiPlan,
    /// Government ID as re-entered by the applicant
    pub gov_id_echo: String,
    #[serde(skip)]
    pub kyc_proof: Vec<u8>,
    pub status: LoanStatus,
    pub admin_comment: Option<String>,
    pub processed_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl LoanRequest {
    /// Move to `next`, stamping the actor; fails on an illegal transition
    pub fn advance(
        &mut self,
        next: LoanStatus,
        actor: &str,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_become(next) {
            return Err(DomainError::illegal_transition("loan request", self.status, next));
        }
        self.status = next;
        self.processed_by = Some(actor.to_string());
        self.processed_at = Some(at);
        if comment.is_some() {
            self.admin_comment = comment;
        }
        Ok(())
    }
}

// =========================================================================
// DeletionRequest
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "PENDING",
            DeletionStatus::Approved => "APPROVED",
            DeletionStatus::Rejected => "REJECTED",
        }
    }
}

impl TryFrom<String> for DeletionStatus {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "PENDING" => Ok(DeletionStatus::Pending),
            "APPROVED" => Ok(DeletionStatus::Approved),
            "REJECTED" => Ok(DeletionStatus::Rejected),
            _ => Err(UnknownValue::new("deletion status", s)),
        }
    }
}

impl std::fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: Uuid,
    pub account_number: String,
    pub requester_name: String,
    pub contact: String,
    pub ifsc: String,
    pub reason: String,
    pub status: DeletionStatus,
    pub admin_comment: Option<String>,
    pub processed_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Loan presence when the request was filed
    pub had_loan: bool,
}

impl DeletionRequest {
    /// Fail unless this request is PENDING and `next` closes it
    pub fn ensure_can_resolve(&self, next: DeletionStatus) -> Result<(), DomainError> {
        if self.status != DeletionStatus::Pending || next == DeletionStatus::Pending {
            return Err(DomainError::illegal_transition("deletion request", self.status, next));
        }
        Ok(())
    }

    /// Close a PENDING request as APPROVED or REJECTED
    pub fn resolve(
        &mut self,
        next: DeletionStatus,
        actor: &str,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_can_resolve(next)?;
        self.status = next;
        self.processed_by = Some(actor.to_string());
        self.processed_at = Some(at);
        self.admin_comment = comment;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(status: LoanStatus) -> LoanRequest {
        LoanRequest {
            id: Uuid::new_v4(),
            account_number: "12345678901".to_string(),
            amount: Amount::from_integer(4000).unwrap(),
            interest_rate: Decimal::from(10),
            loan_type: "Vehicle Loan".to_string(),
            emi_plan: EmiPlan::Monthly,
            gov_id_echo: "ABCDE1234F".to_string(),
            kyc_proof: vec![1],
            status,
            admin_comment: None,
            processed_by: None,
            requested_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn test_loan_state_machine_closure() {
        use LoanStatus::*;
        let all = [Pending, Approved, Rejected, Closed];
        for from in all {
            for to in all {
                let allowed = from.can_become(to);
                let expected = matches!(
                    (from, to),
                    (Pending, Approved) | (Pending, Rejected) | (Approved, Closed)
                );
                assert_eq!(allowed, expected, "{from} -> {to}");
            }
        }
        assert!(Rejected.is_terminal() && Closed.is_terminal());
    }

    #[test]
    fn test_advance_stamps_actor() {
        let mut req = loan(LoanStatus::Pending);
        req.advance(LoanStatus::Approved, "admin", Some("ok".into()), Utc::now()).unwrap();
        assert_eq!(req.status, LoanStatus::Approved);
        assert_eq!(req.processed_by.as_deref(), Some("admin"));

        let err = req.advance(LoanStatus::Rejected, "admin", None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
        assert_eq!(req.status, LoanStatus::Approved);
    }

    #[test]
    fn test_deletion_resolve_once() {
        let mut req = DeletionRequest {
            id: Uuid::new_v4(),
            account_number: "12345678901".to_string(),
            requester_name: "Asha Rao".to_string(),
            contact: "asha@example.com".to_string(),
            ifsc: "ASTN00PUN03".to_string(),
            reason: "moving".to_string(),
            status: DeletionStatus::Pending,
            admin_comment: None,
            processed_by: None,
            requested_at: Utc::now(),
            processed_at: None,
            had_loan: false,
        };
        req.resolve(DeletionStatus::Rejected, "admin", Some("no".into()), Utc::now()).unwrap();
        assert!(req.resolve(DeletionStatus::Approved, "admin", None, Utc::now()).is_err());
    }

    #[test]
    fn test_stored_status_must_be_known() {
        assert_eq!(DeletionStatus::try_from("APPROVED".to_string()), Ok(DeletionStatus::Approved));
        assert_eq!(DeletionStatus::try_from("PENDING".to_string()), Ok(DeletionStatus::Pending));
        let err = DeletionStatus::try_from("approved ".to_string()).unwrap_err();
        assert_eq!(err.kind, "deletion status");
        assert!(DeletionStatus::try_from(String::new()).is_err());

        assert_eq!(LoanStatus::try_from("CLOSED".to_string()), Ok(LoanStatus::Closed));
        assert!(LoanStatus::try_from("CANCELLED".to_string()).is_err());
    }
}
