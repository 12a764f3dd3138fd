//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod loan_terms;
pub mod validation;

pub use amount::{round_money, Amount, AmountError, Balance};
pub use context::{OperationContext, Role};
pub use error::{DomainError, ErrorKind};
pub use loan_terms::{EmiPlan, EmiQuote};
pub use validation::{Gender, GovIdType};
