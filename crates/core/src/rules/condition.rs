//! Condition evaluation against a single tax event or a field map.
//!
//! Conditions are pure predicates. Three JSON shapes are accepted:
//!
//! 1. `{"always": true}`
//! 2. `{"all": [..]}` / `{"any": [..]}`
//! 3. `{"field": "event.amount", "op": "gte", "value": 1000}` or the
//!    compact `{"amount": {"gte": 1000}}`
//!
//! Compact names without the `event.` prefix are auto-prefixed. Unknown
//! operators evaluate to false rather than failing the run.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::RuleParseError;
use crate::events::TaxEvent;

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Matches everything.
    Always,
    /// Conjunction of sub-conditions.
    All(Vec<Condition>),
    /// Disjunction of sub-conditions.
    Any(Vec<Condition>),
    /// Field comparison.
    Cmp {
        /// Field path, `event.`-prefixed.
        field: String,
        /// Operator word as persisted.
        op: String,
        /// Expected value.
        value: Value,
    },
}

impl Condition {
    /// Parses a conditions payload.
    ///
    /// # Errors
    ///
    /// Returns an error for payloads that match none of the accepted
    /// shapes.
    pub fn parse(payload: &Value) -> Result<Self, RuleParseError> {
        let Value::Object(map) = payload else {
            return Err(RuleParseError::BadCondition(payload.to_string()));
        };

        if map.contains_key("always") {
            return Ok(Self::Always);
        }
        if let Some(subs) = map.get("all") {
            return Ok(Self::All(Self::parse_list(subs)?));
        }
        if let Some(subs) = map.get("any") {
            return Ok(Self::Any(Self::parse_list(subs)?));
        }
        if let (Some(field), Some(op)) = (map.get("field"), map.get("op")) {
            let (Value::String(field), Value::String(op)) = (field, op) else {
                return Err(RuleParseError::BadCondition(payload.to_string()));
            };
            return Ok(Self::Cmp {
                field: with_prefix(field),
                op: op.clone(),
                value: map.get("value").cloned().unwrap_or(Value::Null),
            });
        }

        // Compact shape: every entry is a (name, {op: value}) pair; a
        // bare value means equality.
        let mut parts = Vec::with_capacity(map.len());
        for (name, comparator) in map {
            match comparator {
                Value::Object(ops) if !ops.is_empty() => {
                    for (op, value) in ops {
                        parts.push(Self::Cmp {
                            field: with_prefix(name),
                            op: op.clone(),
                            value: value.clone(),
                        });
                    }
                }
                Value::Object(_) => {
                    return Err(RuleParseError::BadCondition(payload.to_string()));
                }
                other => parts.push(Self::Cmp {
                    field: with_prefix(name),
                    op: "eq".to_string(),
                    value: other.clone(),
                }),
            }
        }
        if parts.is_empty() {
            return Err(RuleParseError::BadCondition(payload.to_string()));
        }
        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        Ok(Self::All(parts))
    }

    fn parse_list(value: &Value) -> Result<Vec<Self>, RuleParseError> {
        let Value::Array(items) = value else {
            return Err(RuleParseError::BadCondition(value.to_string()));
        };
        items.iter().map(Self::parse).collect()
    }

    /// Evaluates the condition against a single tax event.
    #[must_use]
    pub fn matches_event(&self, event: &TaxEvent) -> bool {
        match self {
            Self::Always => true,
            Self::All(subs) => subs.iter().all(|c| c.matches_event(event)),
            Self::Any(subs) => subs.iter().any(|c| c.matches_event(event)),
            Self::Cmp { field, op, value } => {
                let actual = resolve_event_field(event, field);
                apply_op(op, &actual, value)
            }
        }
    }

    /// Evaluates the condition against the current logical-field map.
    ///
    /// Field names resolve to amounts in the map; missing fields read as
    /// null.
    #[must_use]
    pub fn matches_fields(&self, fields: &BTreeMap<String, Decimal>) -> bool {
        match self {
            Self::Always => true,
            Self::All(subs) => subs.iter().all(|c| c.matches_fields(fields)),
            Self::Any(subs) => subs.iter().any(|c| c.matches_fields(fields)),
            Self::Cmp { field, op, value } => {
                let name = field.strip_prefix("event.").unwrap_or(field);
                let actual = fields
                    .get(name)
                    .map_or(Value::Null, |d| Value::String(d.to_string()));
                apply_op(op, &actual, value)
            }
        }
    }
}

fn with_prefix(name: &str) -> String {
    if name.starts_with("event.") {
        name.to_string()
    } else {
        format!("event.{name}")
    }
}

/// Resolves an `event.<attr>` path to a JSON value; missing paths yield
/// null.
fn resolve_event_field(event: &TaxEvent, field: &str) -> Value {
    let Some(attr) = field.strip_prefix("event.") else {
        return Value::Null;
    };
    match attr {
        "event_type" => Value::String(event.event_type.clone()),
        "amount" => event
            .amount
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        "currency" => event
            .currency
            .clone()
            .map_or(Value::Null, Value::String),
        "event_date" => Value::String(event.event_date.format("%Y-%m-%d").to_string()),
        "tax_year" => Value::Number(event.tax_year.into()),
        "id" => Value::String(event.id.to_string()),
        "source_record_id" => event
            .source_record_id
            .map_or(Value::Null, |id| Value::String(id.to_string())),
        _ => attr.strip_prefix("metadata.").map_or(Value::Null, |path| {
            lookup_path(&event.metadata, path).cloned().unwrap_or(Value::Null)
        }),
    }
}

/// Dotted lookup into a JSON object tree.
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn apply_op(op: &str, actual: &Value, expected: &Value) -> bool {
    match op {
        "=" | "eq" => loose_eq(actual, expected),
        "!=" | "neq" => !loose_eq(actual, expected),
        "in" => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| loose_eq(actual, item))),
        "not_in" => expected
            .as_array()
            .is_some_and(|items| !items.iter().any(|item| loose_eq(actual, item))),
        ">" | "gt" => numeric_cmp(actual, expected).is_some_and(|o| o.is_gt()),
        ">=" | "gte" => numeric_cmp(actual, expected).is_some_and(|o| o.is_ge()),
        "<" | "lt" => numeric_cmp(actual, expected).is_some_and(|o| o.is_lt()),
        "<=" | "lte" => numeric_cmp(actual, expected).is_some_and(|o| o.is_le()),
        "exists" => !actual.is_null(),
        "not_exists" => actual.is_null(),
        "contains" => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
            _ => false,
        },
        "starts_with" => match (actual, expected) {
            (Value::String(s), Value::String(prefix)) => {
                s.to_lowercase().starts_with(&prefix.to_lowercase())
            }
            _ => false,
        },
        "ends_with" => match (actual, expected) {
            (Value::String(s), Value::String(suffix)) => {
                s.to_lowercase().ends_with(&suffix.to_lowercase())
            }
            _ => false,
        },
        _ => false,
    }
}

/// Extracts a decimal from a number or numeric string.
fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    Some(as_decimal(a)?.cmp(&as_decimal(b)?))
}

/// Equality with numeric string coercion.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_decimal(a), as_decimal(b)) {
        return x == y;
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use salyq_shared::types::{TaxEventId, TaxpayerId};
    use serde_json::json;

    fn event() -> TaxEvent {
        TaxEvent {
            id: TaxEventId::new(),
            taxpayer_id: TaxpayerId::new(),
            source_record_id: None,
            event_type: "EV_FOREIGN_DIVIDENDS".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            amount: Some(dec!(500000)),
            currency: Some("KZT".to_string()),
            metadata: json!({"bank": {"direction": "credit"}, "tags": ["foreign", "dividends"]}),
            tax_year: 2024,
        }
    }

    fn parse(v: Value) -> Condition {
        Condition::parse(&v).unwrap()
    }

    #[test]
    fn test_always() {
        assert!(parse(json!({"always": true})).matches_event(&event()));
    }

    #[test]
    fn test_explicit_triple() {
        let c = parse(json!({"field": "event.event_type", "op": "eq", "value": "EV_FOREIGN_DIVIDENDS"}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_compact_auto_prefix() {
        let c = parse(json!({"event_type": {"eq": "EV_FOREIGN_DIVIDENDS"}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"event_type": {"eq": "EV_OTHER_INCOME"}}));
        assert!(!c.matches_event(&event()));
    }

    #[test]
    fn test_compact_bare_value_is_equality() {
        let c = parse(json!({"currency": "KZT"}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_numeric_coercion() {
        let c = parse(json!({"amount": {"gte": "500000"}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"amount": {"gt": 500000}}));
        assert!(!c.matches_event(&event()));
    }

    #[test]
    fn test_in_and_not_in() {
        let c = parse(json!({"currency": {"in": ["KZT", "USD"]}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"currency": {"not_in": ["EUR"]}}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_all_any() {
        let c = parse(json!({
            "all": [
                {"currency": "KZT"},
                {"any": [{"amount": {"lt": 1}}, {"tax_year": 2024}]}
            ]
        }));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_metadata_dotted_path() {
        let c = parse(json!({"metadata.bank.direction": {"eq": "credit"}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"metadata.bank.missing": {"exists": true}}));
        assert!(!c.matches_event(&event()));
        let c = parse(json!({"metadata.bank.missing": {"not_exists": true}}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_metadata_array_contains() {
        let c = parse(json!({"metadata.tags": {"contains": "foreign"}}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_string_operators() {
        let c = parse(json!({"event_type": {"starts_with": "ev_foreign"}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"event_type": {"ends_with": "DIVIDENDS"}}));
        assert!(c.matches_event(&event()));
        let c = parse(json!({"event_type": {"contains": "foreign"}}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_unknown_operator_is_false() {
        let c = parse(json!({"amount": {"approximately": 500000}}));
        assert!(!c.matches_event(&event()));
    }

    #[test]
    fn test_date_comparison() {
        let c = parse(json!({"event_date": {"eq": "2024-06-15"}}));
        assert!(c.matches_event(&event()));
    }

    #[test]
    fn test_matches_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("LF_INCOME_TOTAL".to_string(), dec!(500000));
        let c = parse(json!({"LF_INCOME_TOTAL": {"gt": 0}}));
        assert!(c.matches_fields(&fields));
        let c = parse(json!({"LF_MISSING": {"exists": true}}));
        assert!(!c.matches_fields(&fields));
    }

    #[test]
    fn test_bad_shapes_rejected() {
        assert!(Condition::parse(&json!("nope")).is_err());
        assert!(Condition::parse(&json!({})).is_err());
        assert!(Condition::parse(&json!({"all": "not-a-list"})).is_err());
    }
}
