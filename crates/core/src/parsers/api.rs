//! Parser for external API pulls.
//!
//! Accepts any of the top-level shapes `{"incomes": [..]}`,
//! `{"items"|"records"|"events": [..]}`, `{"assets": [..]}`,
//! `{"debts": [..]}`, or a single-record object; each branch has a
//! dedicated per-record mapper.

use serde_json::{Map, Value};

use crate::events::{SourceKind, TaxEventInput};

use super::{
    aliases, amount_field, currency_field, date_field, event_input, infer_event_type,
    legacy_income_alias, str_field, ParseError, RawSource, SourceParser,
};

/// Event type for declared assets (no income contribution).
const ASSET_EVENT_TYPE: &str = "EV_ASSET_DECLARED";
/// Event type for declared debts (no income contribution).
const DEBT_EVENT_TYPE: &str = "EV_DEBT_DECLARED";

const ASSET_DATE_ALIASES: &[&str] = &["date", "as_of", "acquired_at", "дата"];
const DEBT_DATE_ALIASES: &[&str] = &["date", "as_of", "issued_at", "дата"];

/// Parser for `api` source records.
pub struct ApiParser;

impl SourceParser for ApiParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Api
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        let payload = source.payload;
        if let Some(Value::Array(records)) = payload.get("incomes") {
            return map_each(records, |record, index| parse_income(source, record, index));
        }
        for key in ["items", "records", "events"] {
            if let Some(Value::Array(records)) = payload.get(key) {
                return map_each(records, |record, index| {
                    parse_generic(source, record, index)
                });
            }
        }
        if let Some(Value::Array(records)) = payload.get("assets") {
            return map_each(records, |record, index| parse_asset(source, record, index));
        }
        if let Some(Value::Array(records)) = payload.get("debts") {
            return map_each(records, |record, index| parse_debt(source, record, index));
        }
        if payload.is_object() {
            return Ok(vec![parse_generic(source, payload, 0)?]);
        }
        Err(ParseError::payload("unrecognized api payload shape"))
    }
}

fn map_each<F>(records: &[Value], mut mapper: F) -> Result<Vec<TaxEventInput>, ParseError>
where
    F: FnMut(&Value, usize) -> Result<TaxEventInput, ParseError>,
{
    records
        .iter()
        .enumerate()
        .map(|(index, record)| mapper(record, index))
        .collect()
}

fn parse_income(
    source: &RawSource<'_>,
    record: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_type = match str_field(record, aliases::EVENT_TYPE) {
        Some(explicit) if explicit.trim().to_uppercase().starts_with("EV_") => {
            explicit.trim().to_uppercase()
        }
        Some(legacy) => legacy_income_alias(legacy)
            .map(String::from)
            .ok_or_else(|| {
                ParseError::at(index, format!("unknown income type: {legacy}"))
            })?,
        None => match str_field(record, &["income_type"]) {
            Some(legacy) => legacy_income_alias(legacy)
                .map(String::from)
                .ok_or_else(|| {
                    ParseError::at(index, format!("unknown income type: {legacy}"))
                })?,
            None => {
                let description = str_field(record, aliases::DESCRIPTION).unwrap_or_default();
                infer_event_type(description).to_string()
            }
        },
    };
    let event_date = date_field(record, aliases::DATE, index)?;
    let amount = amount_field(record, aliases::AMOUNT);
    let currency = amount.map(|_| currency_field(record, aliases::CURRENCY));

    Ok(event_input(
        source,
        event_type,
        event_date,
        amount,
        currency,
        branch_metadata("incomes", record),
    ))
}

fn parse_generic(
    source: &RawSource<'_>,
    record: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_type = match str_field(record, aliases::EVENT_TYPE) {
        Some(explicit) => explicit.trim().to_uppercase(),
        None => {
            let description = str_field(record, aliases::DESCRIPTION).ok_or_else(|| {
                ParseError::at(index, "record has neither event type nor description")
            })?;
            infer_event_type(description).to_string()
        }
    };
    let event_date = date_field(record, aliases::DATE, index)?;
    let amount = amount_field(record, aliases::AMOUNT);
    let currency = amount.map(|_| currency_field(record, aliases::CURRENCY));

    Ok(event_input(
        source,
        event_type,
        event_date,
        amount,
        currency,
        branch_metadata("records", record),
    ))
}

fn parse_asset(
    source: &RawSource<'_>,
    record: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_date = date_field(record, ASSET_DATE_ALIASES, index)?;
    let amount = amount_field(record, &["value", "amount", "стоимость"]);
    let currency = amount.map(|_| currency_field(record, aliases::CURRENCY));

    let mut metadata = Map::new();
    metadata.insert("api_branch".to_string(), Value::String("assets".to_string()));
    if let Some(kind) = str_field(record, &["kind", "type", "вид"]) {
        metadata.insert("asset_kind".to_string(), Value::String(kind.to_string()));
    }

    Ok(event_input(
        source,
        ASSET_EVENT_TYPE,
        event_date,
        amount,
        currency,
        Value::Object(metadata),
    ))
}

fn parse_debt(
    source: &RawSource<'_>,
    record: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_date = date_field(record, DEBT_DATE_ALIASES, index)?;
    let amount = amount_field(record, &["amount", "balance", "сумма"]);
    let currency = amount.map(|_| currency_field(record, aliases::CURRENCY));

    let mut metadata = Map::new();
    metadata.insert("api_branch".to_string(), Value::String("debts".to_string()));
    if let Some(counterparty) = str_field(record, &["counterparty", "creditor", "debtor"]) {
        metadata.insert(
            "counterparty".to_string(),
            Value::String(counterparty.to_string()),
        );
    }

    Ok(event_input(
        source,
        DEBT_EVENT_TYPE,
        event_date,
        amount,
        currency,
        Value::Object(metadata),
    ))
}

fn branch_metadata(branch: &str, record: &Value) -> Value {
    let mut metadata = Map::new();
    metadata.insert("api_branch".to_string(), Value::String(branch.to_string()));
    if let Some(description) = str_field(record, aliases::DESCRIPTION) {
        metadata.insert(
            "description".to_string(),
            Value::String(description.to_string()),
        );
    }
    Value::Object(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use salyq_shared::types::{SourceRecordId, TaxpayerId};
    use serde_json::json;

    fn src(payload: &Value) -> RawSource<'_> {
        RawSource {
            taxpayer_id: TaxpayerId::new(),
            source_record_id: SourceRecordId::new(),
            payload,
        }
    }

    #[test]
    fn test_incomes_branch_with_legacy_type() {
        let payload = json!({"incomes": [
            {"income_type": "INCOME_FOREIGN_DIVIDENDS", "date": "2024-06-15", "amount": 500000}
        ]});
        let events = ApiParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_FOREIGN_DIVIDENDS");
        assert_eq!(events[0].metadata["api_branch"], "incomes");
    }

    #[test]
    fn test_incomes_branch_unknown_type_rejected() {
        let payload = json!({"incomes": [
            {"type": "INCOME_UNSEEN", "date": "2024-06-15", "amount": 1}
        ]});
        let err = ApiParser.parse(&src(&payload)).unwrap_err();
        assert_eq!(err.index, Some(0));
    }

    #[test]
    fn test_records_branch() {
        let payload = json!({"records": [
            {"date": "2024-02-02", "description": "rent for February", "amount": "150 000"}
        ]});
        let events = ApiParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_RENT_INCOME");
        assert_eq!(events[0].amount, Some(dec!(150000)));
    }

    #[test]
    fn test_assets_branch() {
        let payload = json!({"assets": [
            {"kind": "apartment", "as_of": "2024-12-31", "value": 25000000}
        ]});
        let events = ApiParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_ASSET_DECLARED");
        assert_eq!(events[0].metadata["asset_kind"], "apartment");
    }

    #[test]
    fn test_debts_branch() {
        let payload = json!({"debts": [
            {"counterparty": "Halyk Bank", "as_of": "2024-12-31", "amount": 4000000}
        ]});
        let events = ApiParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_DEBT_DECLARED");
        assert_eq!(events[0].metadata["counterparty"], "Halyk Bank");
    }

    #[test]
    fn test_single_record_object() {
        let payload = json!({"event_type": "EV_WINNINGS", "date": "2024-04-01", "amount": 77});
        let events = ApiParser.parse(&src(&payload)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EV_WINNINGS");
    }

    #[test]
    fn test_unrecognized_shape() {
        let payload = json!([1, 2, 3]);
        assert!(ApiParser.parse(&src(&payload)).is_err());
    }
}
