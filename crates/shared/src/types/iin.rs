//! Taxpayer identifier (IIN) validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while validating an IIN.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IinError {
    /// The identifier is not exactly 12 characters long.
    #[error("IIN must be exactly 12 digits, got {0} characters")]
    InvalidLength(usize),

    /// The identifier contains a non-digit character.
    #[error("IIN must contain only digits")]
    NonDigit,
}

/// A validated 12-digit individual identification number.
///
/// Identity is immutable once created; the inner string is only reachable
/// through [`Iin::as_str`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iin(String);

impl Iin {
    /// Validates and wraps a 12-digit identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 12 ASCII digits.
    pub fn new(value: impl Into<String>) -> Result<Self, IinError> {
        let value = value.into();
        if value.len() != 12 {
            return Err(IinError::InvalidLength(value.len()));
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IinError::NonDigit);
        }
        Ok(Self(value))
    }

    /// Returns the identifier digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Iin {
    type Error = IinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Iin> for String {
    fn from(iin: Iin) -> Self {
        iin.0
    }
}

impl std::fmt::Display for Iin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_iin() {
        let iin = Iin::new("880101300123").unwrap();
        assert_eq!(iin.as_str(), "880101300123");
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(Iin::new("12345"), Err(IinError::InvalidLength(5)));
        assert_eq!(Iin::new("1234567890123"), Err(IinError::InvalidLength(13)));
    }

    #[test]
    fn test_non_digit_rejected() {
        assert_eq!(Iin::new("88010130012X"), Err(IinError::NonDigit));
    }

    #[test]
    fn test_serde_roundtrip() {
        let iin = Iin::new("880101300123").unwrap();
        let json = serde_json::to_string(&iin).unwrap();
        assert_eq!(json, "\"880101300123\"");
        let back: Iin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, iin);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<Iin, _> = serde_json::from_str("\"not-an-iin\"");
        assert!(result.is_err());
    }
}
