//! Formula evaluation over the logical-field map.
//!
//! A formula is a number literal, a `{"ref": "LF_*"}` lookup, or a
//! nested operation object. Evaluation is total: missing fields read as
//! zero and division by zero yields zero, so a well-formed formula never
//! fails a run.
//!
//! Legacy textual formulas (`SUM(LF_A, LF_B)`, `SUB(..)`, `MUL(..)`)
//! are parsed into the same tree at catalog load.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::RuleParseError;

/// Comparison operators usable inside formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Gte,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Lte,
    /// Equal.
    Eq,
}

/// A parsed formula tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// Literal number.
    Number(Decimal),
    /// Logical-field lookup; missing fields read as zero.
    Ref(String),
    /// N-ary sum.
    Sum(Vec<Formula>),
    /// Difference `a - b`.
    Sub(Box<Formula>, Box<Formula>),
    /// Product `a * b`.
    Mul(Box<Formula>, Box<Formula>),
    /// Quotient `a / b`; `b = 0` yields zero.
    Div(Box<Formula>, Box<Formula>),
    /// N-ary maximum with an implicit zero floor.
    Max(Vec<Formula>),
    /// N-ary minimum.
    Min(Vec<Formula>),
    /// Half-up rounding to a number of decimals.
    Round(Box<Formula>, u32),
    /// Round towards negative infinity.
    Floor(Box<Formula>),
    /// Round towards positive infinity.
    Ceil(Box<Formula>),
    /// Absolute value.
    Abs(Box<Formula>),
    /// `a * b / 100`.
    Percent(Box<Formula>, Box<Formula>),
    /// `then` if `cond > 0`, else `else` (default zero).
    If(Box<Formula>, Box<Formula>, Box<Formula>),
    /// Predicate yielding 1 or 0.
    Cmp(CmpKind, Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Parses a formula payload: a JSON number, an `LF_*` string, a
    /// legacy textual formula string, a `{"ref": ..}` object, or an
    /// `{"op": ..}` object.
    ///
    /// # Errors
    ///
    /// Returns an error for payloads matching none of the accepted
    /// shapes.
    pub fn parse(payload: &Value) -> Result<Self, RuleParseError> {
        match payload {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .map(Self::Number)
                .map_err(|_| RuleParseError::BadFormula(payload.to_string())),
            Value::String(text) => Self::parse_text(text),
            Value::Object(map) => {
                if let Some(Value::String(name)) = map.get("ref") {
                    return Ok(Self::Ref(name.clone()));
                }
                let Some(Value::String(op)) = map.get("op") else {
                    return Err(RuleParseError::BadFormula(payload.to_string()));
                };
                Self::parse_op(op, map)
            }
            _ => Err(RuleParseError::BadFormula(payload.to_string())),
        }
    }

    fn parse_op(
        op: &str,
        map: &serde_json::Map<String, Value>,
    ) -> Result<Self, RuleParseError> {
        let operands = |map: &serde_json::Map<String, Value>| -> Result<Vec<Self>, RuleParseError> {
            if let Some(Value::Array(items)) = map.get("refs") {
                return items.iter().map(Self::parse).collect();
            }
            let mut out = Vec::with_capacity(2);
            if let Some(a) = map.get("a") {
                out.push(Self::parse(a)?);
            }
            if let Some(b) = map.get("b") {
                out.push(Self::parse(b)?);
            }
            Ok(out)
        };
        let binary = |map: &serde_json::Map<String, Value>| -> Result<(Box<Self>, Box<Self>), RuleParseError> {
            let ops = operands(map)?;
            match <[Self; 2]>::try_from(ops) {
                Ok([a, b]) => Ok((Box::new(a), Box::new(b))),
                Err(_) => Err(RuleParseError::BadFormula(format!("{op} needs two operands"))),
            }
        };
        let unary = |map: &serde_json::Map<String, Value>| -> Result<Box<Self>, RuleParseError> {
            let a = map
                .get("a")
                .ok_or_else(|| RuleParseError::BadFormula(format!("{op} needs an operand")))?;
            Ok(Box::new(Self::parse(a)?))
        };

        match op {
            "sum" => Ok(Self::Sum(operands(map)?)),
            "sub" => binary(map).map(|(a, b)| Self::Sub(a, b)),
            "mul" => binary(map).map(|(a, b)| Self::Mul(a, b)),
            "div" => binary(map).map(|(a, b)| Self::Div(a, b)),
            "max" => Ok(Self::Max(operands(map)?)),
            "min" => Ok(Self::Min(operands(map)?)),
            "round" => {
                let a = unary(map)?;
                let precision = map
                    .get("precision")
                    .or_else(|| map.get("b"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Ok(Self::Round(a, u32::try_from(precision).unwrap_or(0)))
            }
            "floor" => unary(map).map(Self::Floor),
            "ceil" => unary(map).map(Self::Ceil),
            "abs" => unary(map).map(Self::Abs),
            "percent" => binary(map).map(|(a, b)| Self::Percent(a, b)),
            "if" => {
                let cond = map
                    .get("cond")
                    .ok_or_else(|| RuleParseError::BadFormula("if needs cond".to_string()))?;
                let then = map
                    .get("then")
                    .ok_or_else(|| RuleParseError::BadFormula("if needs then".to_string()))?;
                let otherwise = match map.get("else") {
                    Some(v) => Self::parse(v)?,
                    None => Self::Number(Decimal::ZERO),
                };
                Ok(Self::If(
                    Box::new(Self::parse(cond)?),
                    Box::new(Self::parse(then)?),
                    Box::new(otherwise),
                ))
            }
            "gt" => binary(map).map(|(a, b)| Self::Cmp(CmpKind::Gt, a, b)),
            "gte" => binary(map).map(|(a, b)| Self::Cmp(CmpKind::Gte, a, b)),
            "lt" => binary(map).map(|(a, b)| Self::Cmp(CmpKind::Lt, a, b)),
            "lte" => binary(map).map(|(a, b)| Self::Cmp(CmpKind::Lte, a, b)),
            "eq" => binary(map).map(|(a, b)| Self::Cmp(CmpKind::Eq, a, b)),
            other => Err(RuleParseError::BadFormula(format!("unknown op {other}"))),
        }
    }

    /// Parses a string operand: a bare `LF_*` reference, a numeric
    /// literal, or a legacy textual formula.
    fn parse_text(text: &str) -> Result<Self, RuleParseError> {
        let text = text.trim();
        if let Ok(n) = Decimal::from_str(text) {
            return Ok(Self::Number(n));
        }
        if text.contains('(') {
            return Self::parse_legacy(text);
        }
        if text.starts_with("LF_") {
            return Ok(Self::Ref(text.to_string()));
        }
        Err(RuleParseError::BadFormula(text.to_string()))
    }

    /// Parses a legacy textual formula such as `SUM(LF_A, LF_B)` or
    /// `MUL(LF_A, 0.10)`. `SUB` is left-associative.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or unknown function text.
    pub fn parse_legacy(text: &str) -> Result<Self, RuleParseError> {
        let text = text.trim();
        let open = text
            .find('(')
            .ok_or_else(|| RuleParseError::BadFormula(text.to_string()))?;
        if !text.ends_with(')') {
            return Err(RuleParseError::BadFormula(text.to_string()));
        }
        let name = text[..open].trim().to_uppercase();
        let inner = &text[open + 1..text.len() - 1];
        let args: Vec<Self> = inner
            .split(',')
            .map(|arg| Self::parse_text(arg.trim()))
            .collect::<Result<_, _>>()?;
        if args.is_empty() {
            return Err(RuleParseError::BadFormula(text.to_string()));
        }

        let fold_left = |args: Vec<Self>, combine: fn(Box<Self>, Box<Self>) -> Self| {
            let mut iter = args.into_iter();
            iter.next().map(|first| {
                iter.fold(first, |acc, next| combine(Box::new(acc), Box::new(next)))
            })
        };
        let bad = || RuleParseError::BadFormula(text.to_string());

        match name.as_str() {
            "SUM" => Ok(Self::Sum(args)),
            "SUB" => fold_left(args, Self::Sub).ok_or_else(bad),
            "MUL" => fold_left(args, Self::Mul).ok_or_else(bad),
            "DIV" => fold_left(args, Self::Div).ok_or_else(bad),
            "MAX" => Ok(Self::Max(args)),
            "MIN" => Ok(Self::Min(args)),
            other => Err(RuleParseError::BadFormula(format!("unknown function {other}"))),
        }
    }

    /// Evaluates the formula against the current logical-field map.
    #[must_use]
    pub fn eval(&self, fields: &BTreeMap<String, Decimal>) -> Decimal {
        match self {
            Self::Number(n) => *n,
            Self::Ref(name) => fields.get(name).copied().unwrap_or(Decimal::ZERO),
            Self::Sum(args) => args.iter().map(|f| f.eval(fields)).sum(),
            Self::Sub(a, b) => a.eval(fields) - b.eval(fields),
            Self::Mul(a, b) => a.eval(fields) * b.eval(fields),
            Self::Div(a, b) => {
                let divisor = b.eval(fields);
                if divisor.is_zero() {
                    Decimal::ZERO
                } else {
                    a.eval(fields) / divisor
                }
            }
            Self::Max(args) => args
                .iter()
                .map(|f| f.eval(fields))
                .fold(Decimal::ZERO, Decimal::max),
            Self::Min(args) => args
                .iter()
                .map(|f| f.eval(fields))
                .reduce(Decimal::min)
                .unwrap_or(Decimal::ZERO),
            Self::Round(a, precision) => a
                .eval(fields)
                .round_dp_with_strategy(*precision, RoundingStrategy::MidpointAwayFromZero),
            Self::Floor(a) => a.eval(fields).floor(),
            Self::Ceil(a) => a.eval(fields).ceil(),
            Self::Abs(a) => a.eval(fields).abs(),
            Self::Percent(a, b) => a.eval(fields) * b.eval(fields) / Decimal::ONE_HUNDRED,
            Self::If(cond, then, otherwise) => {
                if cond.eval(fields) > Decimal::ZERO {
                    then.eval(fields)
                } else {
                    otherwise.eval(fields)
                }
            }
            Self::Cmp(kind, a, b) => {
                let (a, b) = (a.eval(fields), b.eval(fields));
                let holds = match kind {
                    CmpKind::Gt => a > b,
                    CmpKind::Gte => a >= b,
                    CmpKind::Lt => a < b,
                    CmpKind::Lte => a <= b,
                    CmpKind::Eq => a == b,
                };
                if holds { Decimal::ONE } else { Decimal::ZERO }
            }
        }
    }

    /// Collects every logical field the formula reads.
    pub fn collect_refs(&self, out: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Ref(name) => out.push(name.clone()),
            Self::Sum(args) | Self::Max(args) | Self::Min(args) => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
            Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Percent(a, b)
            | Self::Cmp(_, a, b) => {
                a.collect_refs(out);
                b.collect_refs(out);
            }
            Self::Round(a, _) | Self::Floor(a) | Self::Ceil(a) | Self::Abs(a) => {
                a.collect_refs(out);
            }
            Self::If(cond, then, otherwise) => {
                cond.collect_refs(out);
                then.collect_refs(out);
                otherwise.collect_refs(out);
            }
        }
    }
}

/// Checks a set of `(target, formula)` calculation pairs for reference
/// cycles.
///
/// # Errors
///
/// Returns [`RuleParseError::DependencyCycle`] naming a field on the
/// cycle.
pub fn detect_cycles<'a, I>(rules: I) -> Result<(), RuleParseError>
where
    I: IntoIterator<Item = (&'a str, &'a Formula)>,
{
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (target, formula) in rules {
        let mut refs = Vec::new();
        formula.collect_refs(&mut refs);
        edges.entry(target.to_string()).or_default().extend(refs);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: &str,
        edges: &BTreeMap<String, Vec<String>>,
        marks: &mut BTreeMap<String, Mark>,
    ) -> Result<(), RuleParseError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(RuleParseError::DependencyCycle(node.to_string()));
            }
            None => {}
        }
        marks.insert(node.to_string(), Mark::Visiting);
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if edges.contains_key(dep) {
                    visit(dep, edges, marks)?;
                }
            }
        }
        marks.insert(node.to_string(), Mark::Done);
        Ok(())
    }

    let nodes: Vec<String> = edges.keys().cloned().collect();
    let mut marks = BTreeMap::new();
    for node in &nodes {
        visit(node, &edges, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn fields() -> BTreeMap<String, Decimal> {
        let mut map = BTreeMap::new();
        map.insert("LF_A".to_string(), dec!(100));
        map.insert("LF_B".to_string(), dec!(30));
        map.insert("LF_NEG".to_string(), dec!(-5));
        map
    }

    fn eval(v: serde_json::Value) -> Decimal {
        Formula::parse(&v).unwrap().eval(&fields())
    }

    #[test]
    fn test_literals_and_refs() {
        assert_eq!(eval(json!(42)), dec!(42));
        assert_eq!(eval(json!({"ref": "LF_A"})), dec!(100));
        assert_eq!(eval(json!({"ref": "LF_MISSING"})), dec!(0));
    }

    #[test]
    fn test_sum_refs_and_binary() {
        assert_eq!(eval(json!({"op": "sum", "refs": ["LF_A", "LF_B"]})), dec!(130));
        assert_eq!(
            eval(json!({"op": "sum", "a": {"ref": "LF_A"}, "b": 1})),
            dec!(101)
        );
    }

    #[test]
    fn test_sub_mul_div() {
        assert_eq!(eval(json!({"op": "sub", "a": "LF_A", "b": "LF_B"})), dec!(70));
        assert_eq!(eval(json!({"op": "mul", "a": "LF_B", "b": 2})), dec!(60));
        assert_eq!(eval(json!({"op": "div", "a": "LF_A", "b": 4})), dec!(25));
    }

    #[test]
    fn test_div_by_zero_is_zero() {
        assert_eq!(eval(json!({"op": "div", "a": "LF_A", "b": 0})), dec!(0));
        assert_eq!(
            eval(json!({"op": "div", "a": "LF_A", "b": "LF_MISSING"})),
            dec!(0)
        );
    }

    #[test]
    fn test_max_has_implicit_zero_floor() {
        assert_eq!(eval(json!({"op": "max", "refs": ["LF_NEG"]})), dec!(0));
        assert_eq!(eval(json!({"op": "max", "refs": ["LF_A", "LF_B"]})), dec!(100));
    }

    #[test]
    fn test_min() {
        assert_eq!(eval(json!({"op": "min", "refs": ["LF_A", "LF_B"]})), dec!(30));
        assert_eq!(eval(json!({"op": "min", "refs": ["LF_NEG", "LF_B"]})), dec!(-5));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(
            eval(json!({"op": "round", "a": {"op": "div", "a": "LF_B", "b": 4}})),
            dec!(8)
        );
        assert_eq!(
            eval(json!({"op": "round", "a": {"op": "div", "a": "LF_A", "b": 8}, "precision": 1})),
            dec!(12.5)
        );
    }

    #[test]
    fn test_floor_ceil_abs() {
        assert_eq!(eval(json!({"op": "floor", "a": {"op": "div", "a": "LF_B", "b": 4}})), dec!(7));
        assert_eq!(eval(json!({"op": "ceil", "a": {"op": "div", "a": "LF_B", "b": 4}})), dec!(8));
        assert_eq!(eval(json!({"op": "abs", "a": "LF_NEG"})), dec!(5));
    }

    #[test]
    fn test_percent() {
        assert_eq!(eval(json!({"op": "percent", "a": "LF_A", "b": 10})), dec!(10));
    }

    #[test]
    fn test_if_and_comparisons() {
        assert_eq!(
            eval(json!({"op": "if", "cond": {"op": "gt", "a": "LF_A", "b": 50}, "then": 1, "else": 2})),
            dec!(1)
        );
        assert_eq!(
            eval(json!({"op": "if", "cond": {"op": "lt", "a": "LF_A", "b": 50}, "then": 1})),
            dec!(0)
        );
        assert_eq!(eval(json!({"op": "eq", "a": "LF_A", "b": 100})), dec!(1));
        assert_eq!(eval(json!({"op": "gte", "a": "LF_B", "b": 30})), dec!(1));
        assert_eq!(eval(json!({"op": "lte", "a": "LF_B", "b": 29})), dec!(0));
    }

    #[test]
    fn test_legacy_sum() {
        let f = Formula::parse(&json!("SUM(LF_A, LF_B)")).unwrap();
        assert_eq!(f.eval(&fields()), dec!(130));
    }

    #[test]
    fn test_legacy_sub_left_associative() {
        // 100 - 30 - 30 = 40, not 100 - (30 - 30)
        let f = Formula::parse(&json!("SUB(LF_A, LF_B, LF_B)")).unwrap();
        assert_eq!(f.eval(&fields()), dec!(40));
    }

    #[test]
    fn test_legacy_mul_with_literal() {
        let f = Formula::parse(&json!("MUL(LF_A, 0.10)")).unwrap();
        assert_eq!(f.eval(&fields()), dec!(10));
    }

    #[test]
    fn test_legacy_unknown_function() {
        assert!(Formula::parse(&json!("POW(LF_A, 2)")).is_err());
    }

    #[test]
    fn test_bad_shapes() {
        assert!(Formula::parse(&json!(null)).is_err());
        assert!(Formula::parse(&json!({"op": "sub", "a": 1})).is_err());
        assert!(Formula::parse(&json!("not_a_field")).is_err());
    }

    #[test]
    fn test_detect_cycles_finds_cycle() {
        let a = Formula::Ref("LF_B".to_string());
        let b = Formula::Ref("LF_A".to_string());
        let result = detect_cycles([("LF_A", &a), ("LF_B", &b)]);
        assert!(matches!(result, Err(RuleParseError::DependencyCycle(_))));
    }

    #[test]
    fn test_detect_cycles_accepts_dag() {
        let a = Formula::Ref("LF_B".to_string());
        let b = Formula::Number(dec!(1));
        assert!(detect_cycles([("LF_A", &a), ("LF_B", &b)]).is_ok());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let a = Formula::Sum(vec![Formula::Ref("LF_A".to_string()), Formula::Number(dec!(1))]);
        assert!(detect_cycles([("LF_A", &a)]).is_err());
    }
}
