//! Security module
//!
//! Credential verification, lockout tracks, one-time codes and sessions.

pub mod credential;
pub mod lockout;
pub mod otp;
pub mod session;

pub use credential::{CredentialError, CredentialVerifier, Verification};
pub use lockout::{AttemptOutcome, LockoutTracker};
pub use otp::OtpStore;
pub use session::{Session, SessionRegistry};
