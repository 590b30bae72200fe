//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the
//! application. Amounts cross this boundary as
//! `rust_decimal::Decimal`; rows store them as exact decimal strings.

pub mod catalog;
pub mod declaration;
pub mod event;
pub mod source_record;
pub mod taxpayer;
pub mod xml_export;

pub use catalog::{CatalogRepository, CreateRuleInput};
pub use declaration::DeclarationRepository;
pub use event::EventRepository;
pub use source_record::SourceRecordRepository;
pub use taxpayer::{CreateTaxpayerInput, TaxpayerRepository};
pub use xml_export::XmlExportRepository;

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// Renders a decimal for storage.
pub(crate) fn decimal_to_db(value: Decimal) -> String {
    value.to_string()
}

/// Reads a stored decimal string.
pub(crate) fn decimal_from_db(raw: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|_| StoreError::Corrupt(format!("invalid stored amount: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_roundtrip() {
        for value in [dec!(0), dec!(500000), dec!(-12.34), dec!(1234567890.01)] {
            assert_eq!(decimal_from_db(&decimal_to_db(value)).unwrap(), value);
        }
    }

    #[test]
    fn test_corrupt_amount_rejected() {
        assert!(decimal_from_db("not-a-number").is_err());
    }
}
