//! Shared normalization rules for parser inputs.
//!
//! Every parser funnels raw date, currency, and amount values through
//! these helpers so that the event stream is uniform regardless of
//! source.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Accepted date layouts, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

/// Parses a date in any accepted layout to a calendar date.
///
/// Accepts `YYYY-MM-DD`, `DD.MM.YYYY`, `DD/MM/YYYY`, or an ISO datetime
/// (with or without offset); the date part is taken as-is.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    // ISO datetime, offset or not
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc().date());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    None
}

/// Human words and symbols mapped to ISO codes before truncation.
const CURRENCY_ALIASES: [(&str, &str); 10] = [
    ("$", "USD"),
    ("€", "EUR"),
    ("₽", "RUB"),
    ("₸", "KZT"),
    ("ТЕНГЕ", "KZT"),
    ("ТГ", "KZT"),
    ("ДОЛЛАР", "USD"),
    ("ЕВРО", "EUR"),
    ("РУБЛЬ", "RUB"),
    ("TENGE", "KZT"),
];

/// Normalizes a currency designation to a 3-letter ISO code.
///
/// `None` or blank input falls back to `KZT`. Known words and symbols go
/// through the alias table; everything else is case-folded, trimmed, and
/// truncated to three letters.
#[must_use]
pub fn normalize_currency(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "KZT".to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "KZT".to_string();
    }
    let upper = trimmed.to_uppercase();
    for (alias, code) in CURRENCY_ALIASES {
        if upper == alias {
            return (*code).to_string();
        }
    }
    upper.chars().filter(|c| c.is_alphabetic()).take(3).collect()
}

/// Tolerantly parses an amount.
///
/// Strips spaces (including non-breaking) and accepts `,` as the decimal
/// separator.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Parses an amount from a JSON value: numbers directly, strings
/// tolerantly.
#[must_use]
pub fn amount_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => parse_amount(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_date_iso() {
        assert_eq!(
            parse_date("2024-06-15"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
    }

    #[test]
    fn test_parse_date_dotted() {
        assert_eq!(
            parse_date("15.06.2024"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
    }

    #[test]
    fn test_parse_date_slashed() {
        assert_eq!(
            parse_date("15/06/2024"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
    }

    #[test]
    fn test_parse_date_iso_datetime() {
        assert_eq!(
            parse_date("2024-06-15T10:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
        assert_eq!(
            parse_date("2024-06-15T10:30:00"),
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
    }

    #[test]
    fn test_parse_date_garbage() {
        assert_eq!(parse_date("June 15th"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_currency_default_kzt() {
        assert_eq!(normalize_currency(None), "KZT");
        assert_eq!(normalize_currency(Some("  ")), "KZT");
    }

    #[test]
    fn test_currency_aliases() {
        assert_eq!(normalize_currency(Some("$")), "USD");
        assert_eq!(normalize_currency(Some("тенге")), "KZT");
        assert_eq!(normalize_currency(Some("₸")), "KZT");
    }

    #[test]
    fn test_currency_case_fold_and_truncate() {
        assert_eq!(normalize_currency(Some("usd")), "USD");
        assert_eq!(normalize_currency(Some(" kzt ")), "KZT");
        assert_eq!(normalize_currency(Some("USDT")), "USD");
    }

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount("500000"), Some(dec!(500000)));
        assert_eq!(parse_amount("123.45"), Some(dec!(123.45)));
    }

    #[test]
    fn test_parse_amount_comma_and_spaces() {
        assert_eq!(parse_amount("1 234 567,89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1\u{a0}000"), Some(dec!(1000)));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_amount_from_value() {
        assert_eq!(
            amount_from_value(&serde_json::json!(500000)),
            Some(dec!(500000))
        );
        assert_eq!(
            amount_from_value(&serde_json::json!("1 000,50")),
            Some(dec!(1000.50))
        );
        assert_eq!(amount_from_value(&serde_json::json!(true)), None);
    }
}
