//! Parsers for spreadsheet rows (CSV and Excel imports).
//!
//! Rows are records. A date column is required; the event type comes
//! from an explicit column or is inferred from a description column.
//! Excel additionally supports a multi-sheet shape keyed by sheet name.

use serde_json::{Map, Value};

use crate::events::{SourceKind, TaxEventInput};

use super::{
    aliases, amount_field, currency_field, date_field, event_input, infer_event_type, str_field,
    ParseError, RawSource, SourceParser,
};

/// Parser for `csv` source records.
pub struct CsvParser;

impl SourceParser for CsvParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Csv
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        let rows = extract_rows(source.payload)?;
        parse_rows(source, &rows, None)
    }
}

/// Parser for `excel` source records.
pub struct ExcelParser;

impl SourceParser for ExcelParser {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Excel
    }

    fn parse(&self, source: &RawSource<'_>) -> Result<Vec<TaxEventInput>, ParseError> {
        if let Some(Value::Object(sheets)) = source.payload.get("sheets") {
            // Object iteration is key-sorted, so sheet order is stable.
            let mut events = Vec::new();
            for (sheet_name, sheet_rows) in sheets {
                let rows = rows_from_value(sheet_rows).ok_or_else(|| {
                    ParseError::payload(format!("sheet {sheet_name} is not a row list"))
                })?;
                events.extend(parse_rows(source, &rows, Some(sheet_name))?);
            }
            return Ok(events);
        }
        let rows = extract_rows(source.payload)?;
        parse_rows(source, &rows, None)
    }
}

/// Accepts `{"rows": [..]}`, a bare array, or the
/// `{"headers": [..], "rows": [[..], ..]}` split shape.
fn extract_rows(payload: &Value) -> Result<Vec<Value>, ParseError> {
    if let Some(rows) = rows_from_value(payload) {
        return Ok(rows);
    }
    Err(ParseError::payload("payload has no rows"))
}

fn rows_from_value(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(rows) => Some(rows.clone()),
        Value::Object(map) => match (map.get("headers"), map.get("rows")) {
            (Some(Value::Array(headers)), Some(Value::Array(rows))) => {
                let headers: Vec<String> = headers
                    .iter()
                    .map(|h| h.as_str().unwrap_or_default().to_string())
                    .collect();
                Some(
                    rows.iter()
                        .map(|row| zip_row(&headers, row))
                        .collect(),
                )
            }
            (None, Some(Value::Array(rows))) => Some(rows.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn zip_row(headers: &[String], row: &Value) -> Value {
    match row {
        Value::Array(cells) => {
            let mut object = Map::new();
            for (header, cell) in headers.iter().zip(cells) {
                object.insert(header.clone(), cell.clone());
            }
            Value::Object(object)
        }
        other => other.clone(),
    }
}

fn parse_rows(
    source: &RawSource<'_>,
    rows: &[Value],
    sheet: Option<&str>,
) -> Result<Vec<TaxEventInput>, ParseError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| parse_row(source, row, index, sheet))
        .collect()
}

fn parse_row(
    source: &RawSource<'_>,
    row: &Value,
    index: usize,
    sheet: Option<&str>,
) -> Result<TaxEventInput, ParseError> {
    let event_date = date_field(row, aliases::DATE, index)?;
    let event_type = match str_field(row, aliases::EVENT_TYPE) {
        Some(explicit) => explicit.trim().to_uppercase(),
        None => {
            let description = str_field(row, aliases::DESCRIPTION).ok_or_else(|| {
                ParseError::at(index, "row has neither event type nor description")
            })?;
            infer_event_type(description).to_string()
        }
    };
    let amount = amount_field(row, aliases::AMOUNT);
    let currency = amount.map(|_| currency_field(row, aliases::CURRENCY));

    let mut metadata = Map::new();
    if let Some(sheet) = sheet {
        metadata.insert("sheet".to_string(), Value::String(sheet.to_string()));
    }
    if let Some(description) = str_field(row, aliases::DESCRIPTION) {
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
