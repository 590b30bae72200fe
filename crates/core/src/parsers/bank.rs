//! Parser for bank statement transactions.
//!
//! Each transaction yields at most one event. Direction comes from
//! `credit`/`debit` columns or the sign of the amount; the stored
//! amount is always non-negative and the direction goes into metadata.
//! The event type is inferred from the purpose text, defaulting to the
//! generic non-agent income type.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::events::{SourceKind, TaxEventInput};

use super::{
    amount_field, currency_field, date_field, event_input, infer_event_type, str_field,
    ParseError, RawSource, SourceParser,
};

const DATE_ALIASES: &[&str] = &["transaction_date", "operation_date", "date", "дата"];
const PURPOSE_ALIASES: &[&str] = &["purpose", "description", "details", "назначение"];
const CREDIT_ALIASES: &[&str] = &["credit", "кредит", "приход"];
const DEBIT_ALIASES: &[&str] = &["debit", "дебет", "расход"];
const AMOUNT_ALIASES: &[&str] = &["amount", "sum", "сумма"];
const CURRENCY_ALIASES: &[&str] = &["currency", "cur", "валюта"];

/// Parser for `bank` source records.
pub struct BankParser;

impl SourceParser for BankParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Bank
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        let transactions = match source.payload {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("transactions") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => return Err(ParseError::payload("bank payload has no transactions")),
            },
            _ => return Err(ParseError::payload("bank payload has no transactions")),
        };

        transactions
            .iter()
            .enumerate()
            .map(|(index, txn)| parse_transaction(source, txn, index))
            .collect()
    }
}

fn parse_transaction(
    source: &RawSource<'_>,
    txn: &Value,
    index: usize,
) -> Result<TaxEventInput, ParseError> {
    let event_date = date_field(txn, DATE_ALIASES, index)?;
    let (amount, direction) = resolve_direction(txn, index)?;
    let currency = currency_field(txn, CURRENCY_ALIASES);
    let purpose = str_field(txn, PURPOSE_ALIASES).unwrap_or_default();
    let event_type = infer_event_type(purpose);

    let mut metadata = Map::new();
    metadata.insert("direction".to_string(), Value::String(direction.to_string()));
    if !purpose.is_empty() {
        metadata.insert("purpose".to_string(), Value::String(purpose.to_string()));
    }

    Ok(event_input(
        source,
        event_type,
        event_date,
        Some(amount),
        Some(currency),
        Value::Object(metadata),
    ))
}

/// Resolves the non-negative amount and the direction word.
fn resolve_direction(txn: &Value, index: usize) -> Result<(Decimal, &'static str), ParseError> {
    if let Some(credit) = amount_field(txn, CREDIT_ALIASES) {
        if credit > Decimal::ZERO {
            return Ok((credit, "credit"));
        }
    }
    if let Some(debit) = amount_field(txn, DEBIT_ALIASES) {
        if debit > Decimal::ZERO {
            return Ok((debit, "debit"));
        }
    }
    if let Some(signed) = amount_field(txn, AMOUNT_ALIASES) {
        let direction = if signed.is_sign_negative() { "debit" } else { "credit" };
        return Ok((signed.abs(), direction));
    }
    Err(ParseError::at(index, "transaction has no amount"))
}
