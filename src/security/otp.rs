//! OTP Challenge Store
//!
//! Six-digit one-time codes keyed by identifier (account number or admin
//! username). Only a SHA-256 digest of each code is kept. Issuing replaces
//! whatever code the identifier had; a verified code is spent.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Default code lifetime in minutes
pub const DEFAULT_EXPIRY_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
struct OtpEntry {
    digest: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

#[derive(Debug)]
pub struct OtpStore {
    expiry: Duration,
    entries: Mutex<HashMap<String, OtpEntry>>,
}

impl OtpStore {
    pub fn new(expiry_minutes: i64) -> Self {
        Self {
            expiry: Duration::minutes(expiry_minutes.max(1)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, OtpEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue a fresh code for `identifier`, invalidating any earlier one
    pub fn issue(&self, identifier: &str) -> String {
        self.issue_at(identifier, Utc::now())
    }

    pub fn issue_at(&self, identifier: &str, now: DateTime<Utc>) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let entry = OtpEntry {
            digest: digest(&code),
            issued_at: now,
            expires_at: now + self.expiry,
            consumed: false,
        };

        if self.entries().insert(identifier.to_string(), entry).is_some() {
            tracing::debug!(identifier = %identifier, "Replaced earlier one-time code");
        }
        code
    }

    /// Consume `code` if it is the live code for `identifier`
    pub fn verify(&self, identifier: &str, code: &str) -> bool {
        self.verify_at(identifier, code, Utc::now())
    }

    pub fn verify_at(&self, identifier: &str, code: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(identifier) else {
            return false;
        };

        if entry.consumed || now > entry.expires_at || entry.digest != digest(code.trim()) {
            return false;
        }

        entry.consumed = true;
        tracing::debug!(
            identifier = %identifier,
            age_secs = (now - entry.issued_at).num_seconds(),
            "One-time code verified"
        );
        true
    }

    /// Drop spent and expired codes; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.consumed && entry.expires_at >= now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_MINUTES)
    }
}

fn digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
