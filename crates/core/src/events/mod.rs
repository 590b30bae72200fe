//! Tax event model and input normalization.
//!
//! A tax event is an atomic, dated, typed financial fact attributed to a
//! taxpayer. Events are immutable once stored; parsers produce
//! [`TaxEventInput`] values which the store turns into [`TaxEvent`]s.

pub mod normalize;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use salyq_shared::types::{SourceRecordId, TaxEventId, TaxpayerId};

/// Origin of an ingested source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Hand-entered single event or event list.
    Manual,
    /// Spreadsheet rows exported as CSV.
    Csv,
    /// Spreadsheet rows, optionally grouped by sheet.
    Excel,
    /// Bank statement transactions.
    Bank,
    /// Accounting-system document export.
    Accounting,
    /// External API pull.
    Api,
}

impl SourceKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Bank => "bank",
            Self::Accounting => "accounting",
            Self::Api => "api",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "csv" => Some(Self::Csv),
            "excel" => Some(Self::Excel),
            "bank" => Some(Self::Bank),
            "accounting" => Some(Self::Accounting),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored, immutable tax event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEvent {
    /// Event ID.
    pub id: TaxEventId,
    /// Owning taxpayer.
    pub taxpayer_id: TaxpayerId,
    /// Source record the event was parsed from, if any.
    pub source_record_id: Option<SourceRecordId>,
    /// Event type code (`EV_*`).
    pub event_type: String,
    /// Date the fact occurred.
    pub event_date: NaiveDate,
    /// Monetary amount, when the event carries one.
    pub amount: Option<Decimal>,
    /// ISO 4217 currency code, when the event carries an amount.
    pub currency: Option<String>,
    /// Free-form metadata captured by the parser.
    pub metadata: Value,
    /// Tax year, derived from `event_date`.
    pub tax_year: i32,
}

/// A normalized event produced by a parser, not yet stored.
///
/// The taxpayer and source-record identity are copied from the source
/// record by the caller, never trusted from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEventInput {
    /// Owning taxpayer.
    pub taxpayer_id: TaxpayerId,
    /// Source record the event was parsed from.
    pub source_record_id: SourceRecordId,
    /// Event type code (`EV_*`).
    pub event_type: String,
    /// Date the fact occurred.
    pub event_date: NaiveDate,
    /// Monetary amount, when present.
    pub amount: Option<Decimal>,
    /// ISO 4217 currency code.
    pub currency: Option<String>,
    /// Free-form metadata captured by the parser.
    pub metadata: Value,
}

impl TaxEventInput {
    /// Tax year derived from the event date.
    #[must_use]
    pub fn tax_year(&self) -> i32 {
        self.event_date.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_roundtrip() {
        for kind in [
            SourceKind::Manual,
            SourceKind::Csv,
            SourceKind::Excel,
            SourceKind::Bank,
            SourceKind::Accounting,
            SourceKind::Api,
        ] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("ftp"), None);
    }

    #[test]
    fn test_tax_year_derived_from_date() {
        let input = TaxEventInput {
            taxpayer_id: TaxpayerId::new(),
            source_record_id: SourceRecordId::new(),
            event_type: "EV_OTHER_INCOME".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            amount: None,
            currency: None,
            metadata: Value::Null,
        };
        assert_eq!(input.tax_year(), 2024);
    }
}
