//! Declaration domain types shared by the store and the projector.

use serde::{Deserialize, Serialize};

/// Declaration kind; exactly one of the four XML kind booleans is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    /// First filing for the period.
    Main,
    /// Regular periodic filing.
    Regular,
    /// Additional (corrective) filing.
    Additional,
    /// Filing upon a regulator notice.
    Notice,
}

impl DeclarationKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Regular => "regular",
            Self::Additional => "additional",
            Self::Notice => "notice",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "main" => Some(Self::Main),
            "regular" => Some(Self::Regular),
            "additional" => Some(Self::Additional),
            "notice" => Some(Self::Notice),
            _ => None,
        }
    }

    /// Name of the kind boolean in the XML header.
    #[must_use]
    pub fn xml_flag(&self) -> &'static str {
        match self {
            Self::Main => "dt_main",
            Self::Regular => "dt_regular",
            Self::Additional => "dt_additional",
            Self::Notice => "dt_notice",
        }
    }
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Header attributes snapshot-copied from the taxpayer at generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Taxpayer identifier.
    pub iin: String,
    /// Last name.
    pub last_name: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Middle name.
    pub middle_name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Spouse identifier, when filing covers one.
    pub spouse_iin: Option<String>,
    /// Legal representative identifier.
    pub legal_rep_iin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            DeclarationKind::Main,
            DeclarationKind::Regular,
            DeclarationKind::Additional,
            DeclarationKind::Notice,
        ] {
            assert_eq!(DeclarationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DeclarationKind::parse("interim"), None);
    }

    #[test]
    fn test_xml_flags() {
        assert_eq!(DeclarationKind::Main.xml_flag(), "dt_main");
        assert_eq!(DeclarationKind::Notice.xml_flag(), "dt_notice");
    }
}
