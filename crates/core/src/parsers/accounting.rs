//! Parser for accounting-system exports.
//!
//! Accepts per-document and per-operation shapes. Documents may carry
//! tabular line items; expense documents are skipped without emitting
//! events. Sales and receipt documents map by description keywords.

use serde_json::{Map, Value};

use crate::events::{SourceKind, TaxEventInput};

use super::{
    aliases, amount_field, currency_field, date_field, event_input, infer_event_type, str_field,
    ParseError, RawSource, SourceParser,
};

const DOC_TYPE_ALIASES: &[&str] = &["doc_type", "document_type", "type", "вид"];
const LINE_ALIASES: &[&str] = &["operations", "lines", "items", "операции"];

/// Parser for `accounting` source records.
pub struct AccountingParser;

impl SourceParser for AccountingParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Accounting
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        let payload = source.payload;
        if let Some(Value::Array(documents)) = payload.get("documents") {
            let mut events = Vec::new();
            for (index, document) in documents.iter().enumerate() {
                events.extend(parse_document(source, document, index)?);
            }
            return Ok(events);
        }
        if let Some(Value::Array(operations)) = payload.get("operations") {
            return operations
                .iter()
                .enumerate()
                .map(|(index, op)| parse_operation(source, op, index, None))
                .collect();
        }
        if payload.is_object() {
            return parse_document(source, payload, 0);
        }
        Err(ParseError::payload(
            "accounting payload has neither documents nor operations",
        ))
    }
}

fn parse_document(
    source: &RawSource<'_>,
    document: &Value,
    index: usize,
) -> Result<Vec<TaxEventInput>, ParseError> {
    let doc_type = str_field(document, DOC_TYPE_ALIASES).unwrap_or_default();
    if is_expense(doc_type) {
        return Ok(Vec::new());
    }

    if let Some(Value::Array(lines)) = super::field(document, LINE_ALIASES) {
        let doc_date = date_field(document, aliases::DATE, index)?;
        return lines
            .iter()
            .enumerate()
            .map(|(line_index, line)| {
                parse_operation(source, line, line_index, Some((doc_type, doc_date)))
            })
            .collect();
    }

    Ok(vec![parse_operation(source, document, index, None)?])
}

fn parse_operation(
    source: &RawSource<'_>,
    operation: &Value,
    index: usize,
    document: Option<(&str, chrono::NaiveDate)>,
) -> Result<TaxEventInput, ParseError> {
    let event_date = match document {
        Some((_, doc_date)) => super::field(operation, aliases::DATE)
            .is_some()
            .then(|| date_field(operation, aliases::DATE, index))
            .transpose()?
            .unwrap_or(doc_date),
        None => date_field(operation, aliases::DATE, index)?,
    };

    let description = str_field(operation, aliases::DESCRIPTION)
        .or_else(|| str_field(operation, &["name", "наименование"]))
        .unwrap_or_default();
    let event_type = match str_field(operation, aliases::EVENT_TYPE) {
        Some(explicit) if explicit.trim().to_uppercase().starts_with("EV_") => {
            explicit.trim().to_uppercase()
        }
        _ => infer_event_type(description).to_string(),
    };

    let amount = amount_field(operation, aliases::AMOUNT);
    let currency = amount.map(|_| currency_field(operation, aliases::CURRENCY));

    let mut metadata = Map::new();
    if let Some((doc_type, _)) = document {
        if !doc_type.is_empty() {
            metadata.insert("doc_type".to_string(), Value::String(doc_type.to_string()));
        }
    }
    if !description.is_empty() {
        metadata.insert(
            "description".to_string(),
            Value::String(description.to_string()),
        );
    }

    Ok(event_input(
        source,
        event_type,
        event_date,
        amount,
        currency,
        Value::Object(metadata),
    ))
}

fn is_expense(doc_type: &str) -> bool {
    let lowered = doc_type.to_lowercase();
    lowered.contains("expense") || lowered.contains("расход")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
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
    fn test_expense_documents_skipped() {
        let payload = json!({"documents": [
            {"doc_type": "expense_invoice", "date": "2024-05-01", "amount": 999},
            {"doc_type": "sales_invoice", "date": "2024-05-02", "amount": 1000,
             "description": "dividend distribution"}
        ]});
        let events = AccountingParser.parse(&src(&payload)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EV_DIVIDENDS_KZ");
        assert_eq!(events[0].amount, Some(dec!(1000)));
    }

    #[test]
    fn test_document_with_line_items() {
        let payload = json!({"documents": [{
            "doc_type": "receipt",
            "date": "2024-07-01",
            "operations": [
                {"description": "аренда офиса", "amount": 300000},
                {"description": "прочая услуга", "amount": 50000, "date": "2024-07-15"}
            ]
        }]});
        let events = AccountingParser.parse(&src(&payload)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "EV_RENT_INCOME");
        assert_eq!(
            events[0].event_date,
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            "line without a date inherits the document date"
        );
        assert_eq!(
            events[1].event_date,
            NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
        );
        assert_eq!(events[0].metadata["doc_type"], "receipt");
    }

    #[test]
    fn test_operations_shape() {
        let payload = json!({"operations": [
            {"date": "2024-03-03", "description": "interest accrued", "amount": 1234}
        ]});
        let events = AccountingParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_INTEREST_KZ");
    }

    #[test]
    fn test_explicit_event_type_wins() {
        let payload = json!({"operations": [
            {"date": "2024-03-03", "event_type": "ev_cfc_profit", "amount": 10}
        ]});
        let events = AccountingParser.parse(&src(&payload)).unwrap();
        assert_eq!(events[0].event_type, "EV_CFC_PROFIT");
    }

    #[test]
    fn test_document_without_date_fails() {
        let payload = json!({"documents": [
            {"doc_type": "receipt", "operations": [{"amount": 1}]}
        ]});
        let err = AccountingParser.parse(&src(&payload)).unwrap_err();
        assert!(err.message.contains("missing event date"));
    }

    #[test]
    fn test_bad_payload_shape() {
        let payload = json!("just a string");
        assert!(AccountingParser.parse(&src(&payload)).is_err());
    }
}
