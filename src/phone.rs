//! Phone number normalization and validation.
//!
//! Input numbers arrive in whatever shape the user typed them
//! (`+92 302 7598014`, `92-302-7598014`, ...). Everything downstream works
//! on the normalized E.164 digit string without the leading `+`.

use crate::error::PhoneError;

/// E.164 allows at most 15 digits.
const MAX_DIGITS: usize = 15;
/// Shortest assignable international number.
const MIN_DIGITS: usize = 7;

/// A validated, normalized international phone number (digits only, no `+`).
///
/// This is the cache key, the session directory name source, and the basis
/// of the user's own protocol address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize raw user input into a validated number.
    ///
    /// Strips every non-digit character, then checks the remaining digit
    /// string is a plausible E.164 number: 7 to 15 digits, country code not
    /// starting with zero. Rejection happens before any session or
    /// directory work.
    pub fn normalize(raw: &str) -> Result<Self, PhoneError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.is_empty() {
            return Err(PhoneError::Invalid {
                input: raw.to_string(),
            });
        }
        if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS || digits.starts_with('0') {
            return Err(PhoneError::Invalid {
                input: raw.to_string(),
            });
        }

        Ok(Self(digits))
    }

    /// The normalized digit string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic session directory name for this number.
    pub fn session_dir_name(&self) -> String {
        format!("session_{}", self.0)
    }

    /// The user's own WhatsApp address, used to deliver the credential file.
    pub fn own_jid(&self) -> String {
        format!("{}@s.whatsapp.net", self.0)
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
