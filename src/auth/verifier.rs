//! Credential verification against the stored bcrypt verifier.
//!
//! The admin credential is a single bcrypt string whose cost parameter is
//! embedded in the string itself, so verification replays the same work
//! factor it was created with.

use regex::Regex;
use tracing::error;

/// Reference hash used to burn the work factor when the stored verifier is
/// unusable. Hash of an unguessable throwaway value at cost 12.
const FALLBACK_HASH: &str = "$2b$12$HEbanw2ka0ty3BmiZLIwDuBTVJXcVrAUJpxZWRPRf1nAkl1Hibtw6";

/// Returns true when `verifier` looks like a bcrypt string this crate can
/// verify against (`$2a$`/`$2b$`/`$2y$`, two-digit cost, 53 chars of
/// salt+digest).
#[must_use]
pub fn valid_verifier(verifier: &str) -> bool {
    Regex::new(r"^\$2[aby]\$\d{2}\$[./A-Za-z0-9]{53}$")
        .is_ok_and(|regex| regex.is_match(verifier))
}

/// Holds the password-equivalent verifier for the single admin credential.
#[derive(Clone, Debug)]
pub struct CredentialVerifier {
    verifier: String,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(verifier: String) -> Self {
        Self { verifier }
    }

    /// Create a verifier for `plaintext` at the given cost.
    ///
    /// # Errors
    /// Returns an error when the cost is outside what bcrypt accepts.
    pub fn from_plaintext(plaintext: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self {
            verifier: bcrypt::hash(plaintext, cost)?,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.verifier
    }

    /// Check `candidate` against the stored verifier.
    ///
    /// The full hash computation runs on every call: when the stored
    /// string cannot be parsed the candidate is hashed against a fixed
    /// reference verifier instead, so response time does not reveal
    /// whether the verifier is present or well-formed. Any error maps to
    /// `false`; this never fails toward "authenticated".
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        match bcrypt::verify(candidate, &self.verifier) {
            Ok(matched) => matched,
            Err(err) => {
                error!("Password verification error: {err}");
                let _ = bcrypt::verify(candidate, FALLBACK_HASH);
                false
            }
        }
    }

    /// Produce a fresh verifier string for a rotated password.
    ///
    /// # Errors
    /// Returns an error when hashing fails.
    pub fn rehash(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(plaintext, cost)
    }
}
