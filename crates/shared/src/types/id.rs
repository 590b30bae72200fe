//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `TaxEventId` where a
//! `DeclarationId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(TaxpayerId, "Unique identifier for a taxpayer.");
typed_id!(SourceRecordId, "Unique identifier for an ingested source record.");
typed_id!(TaxEventId, "Unique identifier for a tax event.");
typed_id!(RuleId, "Unique identifier for a catalog rule.");
typed_id!(DeclarationId, "Unique identifier for a declaration.");
typed_id!(
    ValidationReportId,
    "Unique identifier for a validation report."
);
typed_id!(XmlExportId, "Unique identifier for an XML export version.");

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TaxEventId::new(), TaxEventId::new());
    }

    #[test]
    fn test_roundtrip_through_string() {
        let id = DeclarationId::new();
        let parsed = DeclarationId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::now_v7();
        assert_eq!(TaxpayerId::from_uuid(uuid).into_inner(), uuid);
    }
}
