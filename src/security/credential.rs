//! Credential Verifier
//!
//! One-way hashing of PINs with Argon2id (PHC strings). Stored values that
//! are not PHC strings are legacy plaintext: they still verify, and the
//! outcome tells the caller to re-hash and persist.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Prefix of every digest this verifier produces
const PHC_PREFIX: &str = "$argon2";

/// Result of checking a secret against a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    /// Matched a legacy plaintext value; caller should store `hash(secret)`
    ValidNeedsMigration,
    Invalid,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Verification::Invalid)
    }

    pub fn needs_migration(&self) -> bool {
        matches!(self, Verification::ValidNeedsMigration)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Secret must not be empty")]
    EmptySecret,

    #[error("Invalid hashing parameters: {0}")]
    Params(String),

    #[error("Hashing failed: {0}")]
    Hash(String),
}

/// Hash/verify capability for login and transaction PINs
#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
}

impl CredentialVerifier {
    /// Verifier with the library's recommended Argon2id cost
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Verifier with explicit cost (memory in KiB, iterations, lanes)
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, CredentialError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CredentialError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produce a salted digest of `secret`
    pub fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        if secret.trim().is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hash(e.to_string()))?;
        Ok(digest.to_string())
    }

    /// Check `secret` against `stored` (digest or legacy plaintext)
    pub fn verify(&self, secret: &str, stored: &str) -> Verification {
        if secret.is_empty() || stored.is_empty() {
            return Verification::Invalid;
        }

        if !is_digest(stored) {
            return if secret == stored {
                Verification::ValidNeedsMigration
            } else {
                Verification::Invalid
            };
        }

        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential digest is malformed");
                return Verification::Invalid;
            }
        };

        // Parameters come from the PHC string, not from self
        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Verification::Valid,
            Err(_) => Verification::Invalid,
        }
    }
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .finish()
    }
}

/// Is `stored` a digest produced by this verifier?
pub fn is_digest(stored: &str) -> bool {
    stored.starts_with(PHC_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::with_cost(8, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let v = verifier();
        let digest = v.hash("4821").unwrap();

        assert!(is_digest(&digest));
        assert_ne!(digest, "4821");
        assert_eq!(v.verify("4821", &digest), Verification::Valid);
        assert_eq!(v.verify("4822", &digest), Verification::Invalid);
    }

    #[test]
    fn test_hash_is_salted() {
        let v = verifier();
        assert_ne!(v.hash("4821").unwrap(), v.hash("4821").unwrap());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(verifier().hash("  "), Err(CredentialError::EmptySecret)));
        assert_eq!(verifier().verify("", "anything"), Verification::Invalid);
    }

    #[test]
    fn test_legacy_plaintext_signals_migration() {
        let v = verifier();
        let outcome = v.verify("1234", "1234");
        assert!(outcome.is_valid());
        assert!(outcome.needs_migration());
        assert_eq!(v.verify("9999", "1234"), Verification::Invalid);
    }

    #[test]
    fn test_malformed_digest_is_invalid() {
        assert_eq!(verifier().verify("1234", "$argon2id$garbage"), Verification::Invalid);
    }

    #[test]
    fn test_unsalted_sha256_digest_is_not_a_credential() {
        // SHA-256 of "1234"; only plaintext legacy secrets are accepted
        let sha = "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4";
        assert_eq!(verifier().verify("1234", sha), Verification::Invalid);
    }
}
