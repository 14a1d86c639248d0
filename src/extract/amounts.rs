//! Currency-formatted amount normalization.
//!
//! Feed amounts arrive in continental formatting: `€ 1.234,56`, `- € 12,30`,
//! with the euro sign and grouping dots optional. The dot is always a
//! thousands separator here, never a decimal point.

use super::ExtractError;

/// Round to two decimal places with standard float rounding.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a currency-formatted string into a signed amount at 2dp.
///
/// Strips the currency symbol and all whitespace (including non-breaking
/// spaces), drops grouping dots, and treats the comma as the decimal
/// separator. A leading `-` or `+` anywhere before the digits carries the
/// sign through.
pub fn parse_amount(text: &str) -> Result<f64, ExtractError> {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '€' => {}
            '.' => {}
            ',' => cleaned.push('.'),
            c if c.is_whitespace() => {}
            c => cleaned.push(c),
        }
    }

    if cleaned.is_empty() {
        return Err(ExtractError::MalformedAmount(text.to_string()));
    }

    let value: f64 = cleaned
        .parse()
        .map_err(|_| ExtractError::MalformedAmount(text.to_string()))?;
    Ok(round2(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_euro_amount() {
        assert_eq!(parse_amount("€ 1.234,56").unwrap(), 1234.56);
    }

    #[test]
    fn negative_amount_with_short_decimals() {
        let v = parse_amount("-€ 12,3").unwrap();
        assert_eq!(v, -12.3);
        // Canonical form is two decimals; formatting pads, parsing does not.
        assert_eq!(format!("{v:.2}"), "-12.30");
    }

    #[test]
    fn plus_sign_and_nonbreaking_space() {
        assert_eq!(parse_amount("+\u{a0}€\u{a0}25,00").unwrap(), 25.0);
    }

    #[test]
    fn bare_number_without_currency() {
        assert_eq!(parse_amount("7,95").unwrap(), 7.95);
        assert_eq!(parse_amount("1.000.000,01").unwrap(), 1_000_000.01);
    }

    #[test]
    fn long_decimals_round_to_two_places() {
        assert_eq!(parse_amount("0,005").unwrap(), 0.01);
        assert_eq!(parse_amount("12,344").unwrap(), 12.34);
    }

    #[test]
    fn malformed_amounts_are_errors() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("€ ").is_err());
        assert!(parse_amount("n.v.t.").is_err());
        assert!(parse_amount("12,3,4").is_err());
    }
}
