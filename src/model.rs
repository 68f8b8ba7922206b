use std::fmt;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Canonical (uppercase) ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Trims and uppercases `raw`; blank input is not a symbol.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// Parses every entry, silently skipping blanks.
    pub fn parse_all<I, S>(raw: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|symbol| Symbol::parse(symbol.as_ref()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current price snapshot with change metrics, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: String,
    pub change: String,
    pub percent_change: String,
    pub last_updated: NaiveDate,
}

/// One trading day's close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub change: String,
    pub percent_change: String,
}

/// Absolute and percentage change from `previous` to `current`, both
/// rounded to two fraction digits. A zero `previous` reports `0.00` percent.
/// `None` when the arithmetic overflows.
pub fn calculate_change(current: Decimal, previous: Decimal) -> Option<Change> {
    let change = current.checked_sub(previous)?;
    let percent = if previous.is_zero() {
        Decimal::ZERO
    } else {
        change
            .checked_div(previous)?
            .checked_mul(Decimal::ONE_HUNDRED)?
    };

    Some(Change {
        change: format_price(change),
        percent_change: format_price(percent),
    })
}

/// Fixed two-digit rendering, rounding midpoints away from zero.
pub fn format_price(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn change(current: Decimal, previous: Decimal) -> Change {
        calculate_change(current, previous).expect("change in range")
    }

    #[test]
    fn change_from_ninety_to_hundred() {
        let result = change(dec(100), dec(90));
        assert_eq!(result.change, "10.00");
        assert_eq!(result.percent_change, "11.11");
    }

    #[test]
    fn change_from_145_to_150() {
        let result = change(dec(150), dec(145));
        assert_eq!(result.change, "5.00");
        assert_eq!(result.percent_change, "3.45");
    }

    #[test]
    fn negative_change_keeps_sign() {
        let result = change(dec(90), dec(100));
        assert_eq!(result.change, "-10.00");
        assert_eq!(result.percent_change, "-10.00");
    }

    #[test]
    fn zero_previous_close_is_deterministic() {
        let result = change(dec(5), Decimal::ZERO);
        assert_eq!(result.change, "5.00");
        assert_eq!(result.percent_change, "0.00");
    }

    #[test]
    fn overflowing_change_is_none() {
        assert_eq!(calculate_change(Decimal::MAX, dec(-1)), None);
        assert_eq!(calculate_change(Decimal::MIN, Decimal::ONE), None);
    }

    #[test]
    fn overflowing_percentage_is_none() {
        // Change fits, but change / previous * 100 does not.
        let tiny = Decimal::new(1, 28);
        assert_eq!(calculate_change(Decimal::MAX - Decimal::ONE, tiny), None);
    }

    #[test]
    fn negative_previous_close_still_computes() {
        let result = change(dec(10), dec(-10));
        assert_eq!(result.change, "20.00");
        assert_eq!(result.percent_change, "-200.00");
    }

    #[test]
    fn format_price_pads_and_rounds() {
        assert_eq!(format_price(dec(150)), "150.00");
        assert_eq!(format_price(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_price(Decimal::new(1, 1)), "0.10");
    }

    #[test]
    fn symbol_parse_normalises_case_and_whitespace() {
        assert_eq!(Symbol::parse(" aapl ").unwrap().as_str(), "AAPL");
        assert!(Symbol::parse("   ").is_none());
        let parsed = Symbol::parse_all(["msft", "", "Goog"]);
        let names: Vec<_> = parsed.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["MSFT", "GOOG"]);
    }

    #[test]
    fn quote_serialises_with_camel_case_fields() {
        let quote = Quote {
            symbol: "AAPL".into(),
            price: "150.00".into(),
            change: "5.00".into(),
            percent_change: "3.45".into(),
            last_updated: NaiveDate::from_ymd_opt(2025, 8, 30).unwrap(),
        };
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["percentChange"], "3.45");
        assert_eq!(json["lastUpdated"], "2025-08-30");
    }
}
