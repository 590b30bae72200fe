//! Rule records and their tagged action payloads.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use salyq_shared::types::RuleId;

use super::{Condition, Formula, RuleParseError};

/// Rule kinds, in phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Removes matching events from the run.
    Exclusion,
    /// Converts matching events into logical-field contributions.
    Mapping,
    /// Writes a logical field from a formula over other fields.
    Calculation,
    /// Sets declaration flags from field-map conditions.
    Flag,
}

impl RuleKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusion => "exclusion",
            Self::Mapping => "mapping",
            Self::Calculation => "calculation",
            Self::Flag => "flag",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exclusion" => Some(Self::Exclusion),
            "mapping" => Some(Self::Mapping),
            "calculation" => Some(Self::Calculation),
            "flag" => Some(Self::Flag),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a `map` action takes its amount from.
#[derive(Debug, Clone, PartialEq)]
pub enum AmountSource {
    /// The event's own amount.
    EventAmount,
    /// A key inside the event metadata.
    Metadata(String),
    /// A fixed number from the action payload.
    Fixed(Decimal),
}

/// A parsed rule action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Remove the event from the run.
    Exclude,
    /// Add an amount to a logical field.
    Map {
        /// Target logical field.
        target: String,
        /// Amount source; defaults to the event amount.
        amount_source: AmountSource,
        /// Optional multiplier applied to the amount.
        multiplier: Option<Decimal>,
        /// Optional half-up rounding to this many decimals.
        round: Option<u32>,
    },
    /// Overwrite a logical field from a formula.
    Calc {
        /// Target logical field.
        target: String,
        /// Formula evaluated against the current field map.
        formula: Formula,
        /// Optional half-up rounding to this many decimals.
        round: Option<u32>,
        /// Optional lower clamp.
        min: Option<Decimal>,
        /// Optional upper clamp.
        max: Option<Decimal>,
    },
    /// Merge flag values into the declaration flags.
    Flag {
        /// Flag name to value.
        set: BTreeMap<String, bool>,
    },
}

impl Action {
    /// Parses a single action object.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown action types or malformed payloads.
    pub fn parse(payload: &Value) -> Result<Self, RuleParseError> {
        let Value::Object(map) = payload else {
            return Err(RuleParseError::BadAction(payload.to_string()));
        };
        let Some(Value::String(kind)) = map.get("type") else {
            return Err(RuleParseError::BadAction(payload.to_string()));
        };
        match kind.as_str() {
            "exclude" => Ok(Self::Exclude),
            "map" => {
                let target = required_target(map, payload)?;
                let amount_source = match map.get("amount_source") {
                    None => AmountSource::EventAmount,
                    Some(Value::String(s)) if s == "event.amount" => AmountSource::EventAmount,
                    Some(Value::String(s)) => s
                        .strip_prefix("event.metadata.")
                        .or_else(|| s.strip_prefix("metadata."))
                        .map(|key| AmountSource::Metadata(key.to_string()))
                        .ok_or_else(|| RuleParseError::BadAction(payload.to_string()))?,
                    Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
                        .map(AmountSource::Fixed)
                        .map_err(|_| RuleParseError::BadAction(payload.to_string()))?,
                    Some(Value::Object(inner)) => inner
                        .get("fixed")
                        .and_then(decimal_value)
                        .map(AmountSource::Fixed)
                        .ok_or_else(|| RuleParseError::BadAction(payload.to_string()))?,
                    Some(_) => return Err(RuleParseError::BadAction(payload.to_string())),
                };
                Ok(Self::Map {
                    target,
                    amount_source,
                    multiplier: map.get("multiplier").and_then(decimal_value),
                    round: map.get("round").and_then(Value::as_u64).map(|p| p as u32),
                })
            }
            "calc" => {
                let target = required_target(map, payload)?;
                let formula = map
                    .get("formula")
                    .ok_or_else(|| RuleParseError::BadAction(payload.to_string()))
                    .and_then(Formula::parse)?;
                Ok(Self::Calc {
                    target,
                    formula,
                    round: map.get("round").and_then(Value::as_u64).map(|p| p as u32),
                    min: map.get("min").and_then(decimal_value),
                    max: map.get("max").and_then(decimal_value),
                })
            }
            "flag" => {
                let Some(Value::Object(set)) = map.get("set") else {
                    return Err(RuleParseError::BadAction(payload.to_string()));
                };
                let mut flags = BTreeMap::new();
                for (name, value) in set {
                    let Value::Bool(b) = value else {
                        return Err(RuleParseError::BadAction(payload.to_string()));
                    };
                    flags.insert(name.clone(), *b);
                }
                Ok(Self::Flag { set: flags })
            }
            _ => Err(RuleParseError::BadAction(payload.to_string())),
        }
    }

    /// Parses an actions payload: a single action object or a list.
    ///
    /// # Errors
    ///
    /// Returns an error if any element is malformed.
    pub fn parse_list(payload: &Value) -> Result<Vec<Self>, RuleParseError> {
        match payload {
            Value::Array(items) => items.iter().map(Self::parse).collect(),
            object @ Value::Object(_) => Ok(vec![Self::parse(object)?]),
            other => Err(RuleParseError::BadAction(other.to_string())),
        }
    }
}

fn required_target(
    map: &serde_json::Map<String, Value>,
    payload: &Value,
) -> Result<String, RuleParseError> {
    match map.get("target") {
        Some(Value::String(target)) => Ok(target.clone()),
        _ => Err(RuleParseError::BadAction(payload.to_string())),
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// A fully parsed rule, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Rule ID.
    pub id: RuleId,
    /// Human-readable rule code.
    pub code: String,
    /// Tax year the rule applies to; `None` means any year.
    pub tax_year: Option<i32>,
    /// Rule kind.
    pub kind: RuleKind,
    /// Parsed condition tree.
    pub condition: Condition,
    /// Parsed actions, in payload order.
    pub actions: Vec<Action>,
    /// Execution order within the kind; lower runs first.
    pub priority: i32,
}

impl Rule {
    /// Parses a persisted rule from its JSON payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the conditions or actions payload is
    /// malformed.
    pub fn from_payloads(
        id: RuleId,
        code: impl Into<String>,
        tax_year: Option<i32>,
        kind: RuleKind,
        conditions: &Value,
        actions: &Value,
        priority: i32,
    ) -> Result<Self, RuleParseError> {
        Ok(Self {
            id,
            code: code.into(),
            tax_year,
            kind,
            condition: Condition::parse(conditions)?,
            actions: Action::parse_list(actions)?,
            priority,
        })
    }

    /// True if the rule applies to runs of the given tax year.
    #[must_use]
    pub fn applies_to_year(&self, year: i32) -> bool {
        self.tax_year.map_or(true, |y| y == year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_map_action_defaults() {
        let action = Action::parse(&json!({"type": "map", "target": "LF_INCOME_FOREIGN_DIVIDENDS"}))
            .unwrap();
        assert_eq!(
            action,
            Action::Map {
                target: "LF_INCOME_FOREIGN_DIVIDENDS".to_string(),
                amount_source: AmountSource::EventAmount,
                multiplier: None,
                round: None,
            }
        );
    }

    #[test]
    fn test_parse_map_metadata_source() {
        let action = Action::parse(&json!({
            "type": "map",
            "target": "LF_X",
            "amount_source": "event.metadata.net_amount",
            "multiplier": 0.5,
            "round": 2
        }))
        .unwrap();
        assert_eq!(
            action,
            Action::Map {
                target: "LF_X".to_string(),
                amount_source: AmountSource::Metadata("net_amount".to_string()),
                multiplier: Some(dec!(0.5)),
                round: Some(2),
            }
        );
    }

    #[test]
    fn test_parse_map_fixed_source() {
        let action = Action::parse(&json!({
            "type": "map", "target": "LF_X", "amount_source": {"fixed": 1000}
        }))
        .unwrap();
        assert_eq!(
            action,
            Action::Map {
                target: "LF_X".to_string(),
                amount_source: AmountSource::Fixed(dec!(1000)),
                multiplier: None,
                round: None,
            }
        );
    }

    #[test]
    fn test_parse_calc_action() {
        let action = Action::parse(&json!({
            "type": "calc",
            "target": "LF_TAXABLE_INCOME",
            "formula": {"op": "sub", "a": "LF_INCOME_TOTAL", "b": "LF_DEDUCTION_TOTAL"},
            "min": 0
        }))
        .unwrap();
        match action {
            Action::Calc { target, min, .. } => {
                assert_eq!(target, "LF_TAXABLE_INCOME");
                assert_eq!(min, Some(dec!(0)));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_parse_flag_action() {
        let action = Action::parse(&json!({"type": "flag", "set": {"pril_2": true}})).unwrap();
        match action {
            Action::Flag { set } => assert_eq!(set.get("pril_2"), Some(&true)),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_accepts_single_object() {
        let actions = Action::parse_list(&json!({"type": "exclude"})).unwrap();
        assert_eq!(actions, vec![Action::Exclude]);
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(Action::parse(&json!({"type": "teleport"})).is_err());
        assert!(Action::parse(&json!({"target": "LF_X"})).is_err());
    }

    #[test]
    fn test_rule_year_applicability() {
        let rule = Rule::from_payloads(
            RuleId::new(),
            "R-TEST",
            None,
            RuleKind::Mapping,
            &json!({"always": true}),
            &json!([{"type": "map", "target": "LF_X"}]),
            100,
        )
        .unwrap();
        assert!(rule.applies_to_year(2024));
        assert!(rule.applies_to_year(2030));

        let scoped = Rule { tax_year: Some(2024), ..rule };
        assert!(scoped.applies_to_year(2024));
        assert!(!scoped.applies_to_year(2025));
    }
}
