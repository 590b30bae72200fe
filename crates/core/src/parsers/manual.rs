//! Parser for hand-entered events.
//!
//! Accepts a single event object (carrying `event_type`), a list under
//! `events`, or the legacy shape carrying `income_type` which is mapped
//! through the legacy alias table.

use serde_json::Value;

use crate::events::{SourceKind, TaxEventInput};

use super::{
    aliases, amount_field, currency_field, date_field, event_input, field, legacy_income_alias,
    str_field, ParseError, RawSource, SourceParser,
};

/// Parser for `manual` source records.
pub struct ManualParser;

impl SourceParser for ManualParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Manual
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        let payload = source.payload;
        if let Some(Value::Array(records)) = payload.get("events") {
            return records
                .iter()
                .enumerate()
                .map(|(index, record)| parse_record(source, record, index))
                .collect();
        }
        if payload.is_object() {
            return Ok(vec![parse_record(source, payload, 0)?]);
        }
        Err(ParseError::payload("manual payload must be an object"))
    }
}

fn parse_record(
    source: &RawSource<'_>,
    record: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_type = resolve_event_type(record, index)?;
    let event_date = date_field(record, aliases::DATE, index)?;
    let amount = amount_field(record, aliases::AMOUNT);
    let currency = amount.map(|_| currency_field(record, aliases::CURRENCY));

    let metadata = field(record, &["metadata"])
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    Ok(event_input(
        source, event_type, event_date, amount, currency, metadata,
    ))
}

fn resolve_event_type(record: &Value, index: usize) -> Result<String, ParseError> {
    if let Some(explicit) = str_field(record, aliases::EVENT_TYPE) {
        return Ok(explicit.trim().to_uppercase());
    }
    if let Some(legacy) = str_field(record, &["income_type"]) {
        return legacy_income_alias(legacy)
            .map(String::from)
            .ok_or_else(|| {
                ParseError::at(index, format!("unknown legacy income type: {legacy}"))
            });
    }
    Err(ParseError::at(index, "missing event type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use salyq_shared::types::{SourceRecordId, TaxpayerId};
    use serde_json::json;

    fn source(payload: &Value) -> (TaxpayerId, SourceRecordId, RawSource<'_>) {
        let taxpayer_id = TaxpayerId::new();
        let source_record_id = SourceRecordId::new();
        (
            taxpayer_id,
            source_record_id,
            RawSource {
                taxpayer_id,
                source_record_id,
                payload,
            },
        )
    }

    #[test]
    fn test_single_event_object() {
        let payload = json!({
            "event_type": "EV_FOREIGN_DIVIDENDS",
            "date": "2024-06-15",
            "amount": "500 000",
            "currency": "kzt"
        });
        let (taxpayer_id, source_record_id, src) = source(&payload);
        let events = ManualParser.parse(&src).unwrap();

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.taxpayer_id, taxpayer_id);
        assert_eq!(e.source_record_id, source_record_id);
        assert_eq!(e.event_type, "EV_FOREIGN_DIVIDENDS");
        assert_eq!(e.event_date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(e.amount, Some(dec!(500000)));
        assert_eq!(e.currency.as_deref(), Some("KZT"));
    }

    #[test]
    fn test_event_list() {
        let payload = json!({
            "events": [
                {"event_type": "EV_RENT_INCOME", "date": "15.01.2024", "amount": 100},
                {"event_type": "EV_RENT_INCOME", "date": "15.02.2024", "amount": 100}
            ]
        });
        let (_, _, src) = source(&payload);
        let events = ManualParser.parse(&src).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].event_date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_legacy_income_type() {
        let payload = json!({"income_type": "INCOME_DIVIDENDS", "date": "2024-03-01", "amount": 10});
        let (_, _, src) = source(&payload);
        let events = ManualParser.parse(&src).unwrap();
        assert_eq!(events[0].event_type, "EV_DIVIDENDS_KZ");
    }

    #[test]
    fn test_unknown_legacy_code_rejected() {
        let payload = json!({"income_type": "INCOME_MYSTERY", "date": "2024-03-01"});
        let (_, _, src) = source(&payload);
        let err = ManualParser.parse(&src).unwrap_err();
        assert!(err.message.contains("unknown legacy income type"));
    }

    #[test]
    fn test_missing_date_rejected_with_index() {
        let payload = json!({
            "events": [
                {"event_type": "EV_RENT_INCOME", "date": "2024-01-15", "amount": 100},
                {"event_type": "EV_RENT_INCOME", "amount": 100}
            ]
        });
        let (_, _, src) = source(&payload);
        let err = ManualParser.parse(&src).unwrap_err();
        assert_eq!(err.index, Some(1));
    }

    #[test]
    fn test_missing_event_type_rejected() {
        let payload = json!({"date": "2024-01-15", "amount": 100});
        let (_, _, src) = source(&payload);
        let err = ManualParser.parse(&src).unwrap_err();
        assert!(err.message.contains("missing event type"));
    }

    #[test]
    fn test_event_without_amount_keeps_no_currency() {
        let payload = json!({"event_type": "EV_ASSET_DECLARED", "date": "2024-12-31"});
        let (_, _, src) = source(&payload);
        let events = ManualParser.parse(&src).unwrap();
        assert_eq!(events[0].amount, None);
        assert_eq!(events[0].currency, None);
    }

    #[test]
    fn test_metadata_passthrough() {
        let payload = json!({
            "event_type": "EV_RENT_INCOME",
            "date": "2024-01-15",
            "amount": 100,
            "metadata": {"note": "january"}
        });
        let (_, _, src) = source(&payload);
        let events = ManualParser.parse(&src).unwrap();
        assert_eq!(events[0].metadata["note"], "january");
    }
}
