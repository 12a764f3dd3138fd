//! Duplicate-Request Guard
//!
//! Keys are SHA-256 digests of the canonical request line
//! (`OP|account(s)|amount|client token`), remembered with their last-seen time.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::domain::Amount;

/// Default de-duplication window
pub const DEFAULT_WINDOW_MS: i64 = 3000;

/// Canonical identity of a mutating request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn deposit(account: &str, amount: &Amount, client_token: Option<&str>) -> Self {
        Self::build(&["DEPOSIT", account, &amount.to_string()], client_token)
    }

    pub fn withdraw(account: &str, amount: &Amount, client_token: Option<&str>) -> Self {
        Self::build(&["WITHDRAW", account, &amount.to_string()], client_token)
    }

    pub fn transfer(from: &str, to: &str, amount: &Amount, client_token: Option<&str>) -> Self {
        Self::build(&["TRANSFER", from, to, &amount.to_string()], client_token)
    }

    fn build(parts: &[&str], client_token: Option<&str>) -> Self {
        let mut line = parts.join("|");
        line.push('|');
        line.push_str(client_token.map(str::trim).unwrap_or(""));

        let mut hasher = Sha256::new();
        hasher.update(line.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub struct DuplicateGuard {
    window: Duration,
    seen: Mutex<HashMap<RequestKey, DateTime<Utc>>>,
}

impl DuplicateGuard {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window: Duration::milliseconds(window_ms.max(0)),
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn seen_map(&self) -> MutexGuard<'_, HashMap<RequestKey, DateTime<Utc>>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True if `key` was seen within the window. Either way the key's
    /// last-seen time becomes now.
    pub fn seen(&self, key: &RequestKey) -> bool {
        self.seen_at(key, Utc::now())
    }

    pub fn seen_at(&self, key: &RequestKey, now: DateTime<Utc>) -> bool {
        let mut map = self.seen_map();
        let duplicate = map
            .get(key)
            .is_some_and(|last| now - *last < self.window);
        map.insert(key.clone(), now);
        duplicate
    }

    /// Forget keys older than the window
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.seen_map();
        let before = map.len();
        let window = self.window;
        map.retain(|_, last| now - *last < window);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.seen_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(v: i64) -> Amount {
        Amount::from_integer(v).unwrap()
    }

    #[test]
    fn test_key_is_digest() {
        let key = RequestKey::deposit("12345678901", &amount(100), None);
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(key, RequestKey::deposit("12345678901", &amount(100), None));
        assert_ne!(key, RequestKey::withdraw("12345678901", &amount(100), None));
        assert_ne!(key, RequestKey::deposit("12345678901", &amount(100), Some("r-1")));
    }

    #[test]
    fn test_duplicate_inside_window() {
        let guard = DuplicateGuard::new(3000);
        let key = RequestKey::transfer("12345678901", "10987654321", &amount(500), Some("abc"));
        let now = Utc::now();

        assert!(!guard.seen_at(&key, now));
        assert!(guard.seen_at(&key, now + Duration::milliseconds(2999)));
    }

    #[test]
    fn test_window_elapsed() {
        let guard = DuplicateGuard::new(3000);
        let key = RequestKey::withdraw("12345678901", &amount(500), None);
        let now = Utc::now();

        assert!(!guard.seen_at(&key, now));
        assert!(!guard.seen_at(&key, now + Duration::milliseconds(3000)));
    }

    #[test]
    fn test_sweep() {
        let guard = DuplicateGuard::new(3000);
        let now = Utc::now();
        guard.seen_at(&RequestKey::deposit("1", &amount(1), None), now);
        guard.seen_at(&RequestKey::deposit("2", &amount(1), None), now + Duration::seconds(5));

        assert_eq!(guard.sweep(now + Duration::seconds(6)), 1);
        assert_eq!(guard.len(), 1);
    }
}
