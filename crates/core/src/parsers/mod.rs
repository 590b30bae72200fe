//! Source parsers: one per source kind, selected through a registry.
//!
//! A parser converts one source record's raw JSON payload into a finite
//! ordered sequence of normalized [`TaxEventInput`]s. Parsers never
//! write to the store, and they fail on the first invalid record; no
//! partial output is emitted.
//!
//! Payload shapes are schema-free: parsers discover fields by name with
//! case-insensitive matching over a ranked list of aliases.

mod accounting;
mod api;
mod bank;
mod manual;
mod tabular;

pub use accounting::AccountingParser;
pub use api::ApiParser;
pub use bank::BankParser;
pub use manual::ManualParser;
pub use tabular::{CsvParser, ExcelParser};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use salyq_shared::types::{SourceRecordId, TaxpayerId};

use crate::events::normalize;
use crate::events::{SourceKind, TaxEventInput};

/// A source record handed to a parser.
///
/// Identity fields are copied from the stored record, never trusted
/// from the payload.
#[derive(Debug, Clone, Copy)]
pub struct RawSource<'a> {
    /// Owning taxpayer.
    pub taxpayer_id: TaxpayerId,
    /// Source record being parsed.
    pub source_record_id: SourceRecordId,
    /// Raw payload as ingested.
    pub payload: &'a Value,
}

/// A structured parser rejection.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {}: {message}", index.map_or_else(|| "-".to_string(), |i| i.to_string()))]
pub struct ParseError {
    /// Index of the offending record within the payload, when known.
    pub index: Option<usize>,
    /// What was wrong.
    pub message: String,
}

impl ParseError {
    /// A payload-level failure not tied to a single record.
    #[must_use]
    pub fn payload(message: impl Into<String>) -> Self {
        Self {
            index: None,
            message: message.into(),
        }
    }

    /// A failure at a specific record index.
    #[must_use]
    pub fn at(index: usize, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            message: message.into(),
        }
    }
}

/// One parser per source kind.
pub trait SourceParser: Send + Sync {
    /// The source kind this parser handles.
    fn source_kind(&self) -> SourceKind;

    /// Converts the payload into normalized event inputs.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] on the first validation failure.
    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError>;
}

/// Registry selecting a parser by source kind.
pub struct ParserRegistry {
    parsers: HashMap<SourceKind, Box<dyn SourceParser>>,
}

impl ParserRegistry {
    /// Builds the standard registry with all six parsers.
    #[must_use]
    pub fn standard() -> Self {
        let parsers: Vec<Box<dyn SourceParser>> = vec![
            Box::new(ManualParser),
            Box::new(CsvParser),
            Box::new(ExcelParser),
            Box::new(BankParser),
            Box::new(AccountingParser),
            Box::new(ApiParser),
        ];
        Self {
            parsers: parsers
                .into_iter()
                .map(|p| (p.source_kind(), p))
                .collect(),
        }
    }

    /// Looks up the parser for a source kind.
    #[must_use]
    pub fn get(&self, kind: SourceKind) -> Option<&dyn SourceParser> {
        self.parsers.get(&kind).map(AsRef::as_ref)
    }

    /// Parses a source record with the parser registered for its kind.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if no parser is registered or the
    /// payload is rejected.
    pub fn parse(
        &self,
        kind: SourceKind,
        source: &RawSource<'_>,
    ) -> Result<Vec<TaxEventInput>, ParseError> {
        let parser = self
            .get(kind)
            .ok_or_else(|| ParseError::payload(format!("no parser for source kind {kind}")))?;
        parser.parse(source)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Legacy `INCOME_*` codes mapped to the event-type vocabulary.
const LEGACY_INCOME_ALIASES: [(&str, &str); 9] = [
    ("INCOME_FOREIGN_DIVIDENDS", "EV_FOREIGN_DIVIDENDS"),
    ("INCOME_PROPERTY_SALE", "EV_PROPERTY_SALE_KZ"),
    ("INCOME_VEHICLE_SALE", "EV_VEHICLE_SALE"),
    ("INCOME_RENT", "EV_RENT_INCOME"),
    ("INCOME_SALARY", "EV_EMPLOYMENT_INCOME"),
    ("INCOME_DIVIDENDS", "EV_DIVIDENDS_KZ"),
    ("INCOME_INTEREST", "EV_INTEREST_KZ"),
    ("INCOME_WINNINGS", "EV_WINNINGS"),
    ("INCOME_OTHER", "EV_OTHER_INCOME"),
];

/// Maps a legacy `INCOME_*` code to its event type.
#[must_use]
pub fn legacy_income_alias(code: &str) -> Option<&'static str> {
    let upper = code.trim().to_uppercase();
    LEGACY_INCOME_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == upper)
        .map(|(_, event_type)| *event_type)
}

/// Ranked substring rules inferring an event type from free text.
const DESCRIPTION_RULES: [(&[&str], &str); 7] = [
    (&["rent", "аренда", "арендн"], "EV_RENT_INCOME"),
    (&["dividend", "дивиденд"], "EV_DIVIDENDS_KZ"),
    (&["interest", "процент", "вознаграждени"], "EV_INTEREST_KZ"),
    (&["property", "недвижимост", "квартир"], "EV_PROPERTY_SALE_KZ"),
    (&["vehicle", "автомобил", "транспорт"], "EV_VEHICLE_SALE"),
    (&["foreign", "из-за рубежа", "swift"], "EV_FOREIGN_TRANSFER"),
    (&["winning", "выигрыш", "лотере"], "EV_WINNINGS"),
];

/// Default event type when no description rule matches.
pub const GENERIC_INCOME_TYPE: &str = "EV_OTHER_INCOME";

/// Infers an event type from description text; the first matching rule
/// wins.
#[must_use]
pub fn infer_event_type(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    for (needles, event_type) in DESCRIPTION_RULES {
        if needles.iter().any(|needle| lowered.contains(needle)) {
            return event_type;
        }
    }
    GENERIC_INCOME_TYPE
}

/// Fetches the first present field by ranked, case-insensitive aliases.
///
/// Case folding is Unicode-aware so Cyrillic column headers match too.
#[must_use]
pub fn field<'a>(record: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let object = record.as_object()?;
    for alias in aliases {
        let alias = alias.to_lowercase();
        for (key, value) in object {
            if key.to_lowercase() == alias && !value.is_null() {
                return Some(value);
            }
        }
    }
    None
}

/// Fetches a string field by aliases.
#[must_use]
pub fn str_field<'a>(record: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    field(record, aliases).and_then(Value::as_str)
}

/// Fetches and normalizes an amount field by aliases.
#[must_use]
pub fn amount_field(record: &Value, aliases: &[&str]) -> Option<Decimal> {
    field(record, aliases).and_then(normalize::amount_from_value)
}

/// Fetches and normalizes a currency field by aliases, defaulting to
/// KZT.
#[must_use]
pub fn currency_field(record: &Value, aliases: &[&str]) -> String {
    normalize::normalize_currency(str_field(record, aliases))
}

/// Fetches and parses a required date field.
///
/// # Errors
///
/// Returns a [`ParseError`] if the field is missing or unparseable.
pub fn date_field(
    record: &Value,
    aliases: &[&str],
    index: usize,
) -> Result<NaiveDate, ParseError> {
    let raw = field(record, aliases)
        .ok_or_else(|| ParseError::at(index, "missing event date"))?;
    let text = match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    normalize::parse_date(&text)
        .ok_or_else(|| ParseError::at(index, format!("unparseable date: {text}")))
}

/// Builds an event input, copying identity from the source record.
#[must_use]
pub fn event_input(
    source: &RawSource<'_>,
    event_type: impl Into<String>,
    event_date: NaiveDate,
    amount: Option<Decimal>,
    currency: Option<String>,
    metadata: Value,
) -> TaxEventInput {
    TaxEventInput {
        taxpayer_id: source.taxpayer_id,
        source_record_id: source.source_record_id,
        event_type: event_type.into(),
        event_date,
        amount,
        currency,
        metadata,
    }
}

/// Common column aliases shared by the tabular-ish parsers.
pub(crate) mod aliases {
    /// Date columns.
    pub const DATE: &[&str] = &["event_date", "date", "dt", "дата"];
    /// Explicit event-type columns.
    pub const EVENT_TYPE: &[&str] = &["event_type", "type", "тип"];
    /// Amount columns.
    pub const AMOUNT: &[&str] = &["amount", "sum", "value", "сумма"];
    /// Currency columns.
    pub const CURRENCY: &[&str] = &["currency", "cur", "валюта"];
    /// Description columns.
    pub const DESCRIPTION: &[&str] = &["description", "desc", "purpose", "описание", "назначение"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_covers_all_kinds() {
        let registry = ParserRegistry::standard();
        for kind in [
            SourceKind::Manual,
            SourceKind::Csv,
            SourceKind::Excel,
            SourceKind::Bank,
            SourceKind::Accounting,
            SourceKind::Api,
        ] {
            assert!(registry.get(kind).is_some(), "missing parser for {kind}");
        }
    }

    #[test]
    fn test_legacy_alias_lookup() {
        assert_eq!(
            legacy_income_alias("INCOME_DIVIDENDS"),
            Some("EV_DIVIDENDS_KZ")
        );
        assert_eq!(
            legacy_income_alias("income_rent"),
            Some("EV_RENT_INCOME")
        );
        assert_eq!(legacy_income_alias("INCOME_UNSEEN"), None);
    }

    #[test]
    fn test_infer_event_type_ranked() {
        assert_eq!(infer_event_type("Оплата аренды за июнь"), "EV_RENT_INCOME");
        assert_eq!(infer_event_type("SWIFT transfer"), "EV_FOREIGN_TRANSFER");
        assert_eq!(infer_event_type("Dividend payout"), "EV_DIVIDENDS_KZ");
        assert_eq!(infer_event_type("misc payment"), GENERIC_INCOME_TYPE);
    }

    #[test]
    fn test_field_lookup_case_insensitive_and_ranked() {
        let record = json!({"Date": "2024-01-01", "DT": "1999-01-01", "Amount": "1 000,5"});
        assert_eq!(
            str_field(&record, aliases::DATE),
            Some("2024-01-01"),
            "first alias wins over later ones"
        );
        assert_eq!(
            amount_field(&record, aliases::AMOUNT),
            Some(rust_decimal_macros::dec!(1000.5))
        );
    }

    #[test]
    fn test_null_fields_skipped() {
        let record = json!({"date": null, "DATE": "2024-01-01"});
        assert_eq!(str_field(&record, aliases::DATE), Some("2024-01-01"));
    }
}
