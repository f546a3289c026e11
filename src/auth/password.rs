//! Strength policy for rotated admin passwords.

pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 128;

/// Punctuation class accepted as the "special character" requirement.
const PUNCTUATION: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Passwords rejected outright regardless of character classes.
const WEAK_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "p@ssword1",
    "p@ssw0rd",
    "admin123",
    "administrator1",
    "qwerty123",
    "letmein1",
    "welcome1",
    "changeme1",
    "iloveyou1",
    "sunshine1",
    "monkey123",
    "dragon123",
    "trustno1",
    "abc12345",
    "test1234",
    "123456789",
];

/// Why a candidate password was rejected. The message is surfaced verbatim
/// in the 400 response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Password must be between {MIN_LENGTH} and {MAX_LENGTH} characters")]
    Length,
    #[error("Password must contain an uppercase letter")]
    MissingUppercase,
    #[error("Password must contain a lowercase letter")]
    MissingLowercase,
    #[error("Password must contain a digit")]
    MissingDigit,
    #[error("Password must contain a punctuation character")]
    MissingPunctuation,
    #[error("Password is too common")]
    CommonPassword,
}

/// Validate `candidate` against the strength policy.
///
/// # Errors
/// Returns the first violated rule, checked in a fixed order so error
/// messages are stable.
pub fn check_strength(candidate: &str) -> Result<(), PolicyViolation> {
    let length = candidate.chars().count();
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(PolicyViolation::Length);
    }
    if !candidate.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PolicyViolation::MissingUppercase);
    }
    if !candidate.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PolicyViolation::MissingLowercase);
    }
    if !candidate.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyViolation::MissingDigit);
    }
    if !candidate.chars().any(|c| PUNCTUATION.contains(c)) {
        return Err(PolicyViolation::MissingPunctuation);
    }
    let lowered = candidate.to_lowercase();
    if WEAK_PASSWORDS.contains(&lowered.as_str()) {
        return Err(PolicyViolation::CommonPassword);
    }
    Ok(())
}
