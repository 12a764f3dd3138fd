//! Administrator record
//!
//! Admins authenticate with a username and password, share the login
//! lockout rules of customers and receive their one-time codes on the
//! registered email and phone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LockTrack;

/// Username of the bootstrap administrator; cannot be deleted and is the
/// only admin allowed to edit other admins' contact details
pub const DEFAULT_ADMIN: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub username: String,
    pub holder_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip)]
    pub password_hash: String,
    pub login_track: LockTrack,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminUser {
    pub fn is_default(&self) -> bool {
        is_default_admin(&self.username)
    }
}

pub fn is_default_admin(username: &str) -> bool {
    username.trim().eq_ignore_ascii_case(DEFAULT_ADMIN)
}

/// Lowercased holder name with all whitespace removed
pub fn username_base(holder_name: &str) -> String {
    holder_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `base`, then `base1`, `base2`, ... as candidates for a free username
pub fn username_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1u32..).map(move |n| format!("{base}{n}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_holder_name() {
        assert_eq!(username_base("  Meera  K Nair "), "meeraknair");
        assert_eq!(username_base("Ravi Shankar"), "ravishankar");

        let candidates: Vec<String> = username_candidates("ravishankar").take(3).collect();
        assert_eq!(candidates, vec!["ravishankar", "ravishankar1", "ravishankar2"]);
    }

    #[test]
    fn test_default_admin_is_case_insensitive() {
        assert!(is_default_admin("Admin"));
        assert!(!is_default_admin("admin1"));
    }
}
