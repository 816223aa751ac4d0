use std::fmt;

/// Money is stored as integer cents to keep balance arithmetic exact.
/// For USD, 1 dollar = 100 cents, so $75.50 = 7550 cents.
pub type Cents = i64;

/// Format cents as a decimal amount.
/// Example: 7550 -> "75.50", -325 -> "-3.25"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Format cents with an explicit sign, used for deltas and drift.
/// Example: 7550 -> "+75.50", -325 -> "-3.25", 0 -> "0.00"
pub fn format_cents_signed(cents: Cents) -> String {
    if cents > 0 {
        format!("+{}", format_cents(cents))
    } else {
        format_cents(cents)
    }
}

/// Parse a decimal string into cents. Up to two decimal places are kept,
/// anything beyond is truncated.
/// Example: "75.50" -> 7550, "12.5" -> 1250, "100" -> 10000
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, input) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let cents = match input.split_once('.') {
        None => {
            let units: i64 = input.parse().map_err(|_| ParseCentsError::InvalidFormat)?;
            units * 100
        }
        Some((units_str, decimal_str)) => {
            if decimal_str.contains('.') {
                return Err(ParseCentsError::InvalidFormat);
            }
            let units: i64 = if units_str.is_empty() {
                0
            } else {
                units_str
                    .parse()
                    .map_err(|_| ParseCentsError::InvalidFormat)?
            };
            let decimal_cents: i64 = match decimal_str.len() {
                0 => 0,
                // A single digit like "5" means 50 cents
                1 => {
                    decimal_str
                        .parse::<i64>()
                        .map_err(|_| ParseCentsError::InvalidFormat)?
                        * 10
                }
                _ => decimal_str[..2]
                    .parse()
                    .map_err(|_| ParseCentsError::InvalidFormat)?,
            };
            units * 100 + decimal_cents
        }
    };

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(7550), "75.50");
        assert_eq!(format_cents(18000), "180.00");
        assert_eq!(format_cents(100), "1.00");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-7550), "-75.50");
        assert_eq!(format_cents(-1), "-0.01");
    }

    #[test]
    fn test_format_cents_signed() {
        assert_eq!(format_cents_signed(1234), "+12.34");
        assert_eq!(format_cents_signed(-1234), "-12.34");
        assert_eq!(format_cents_signed(0), "0.00");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("75.50"), Ok(7550));
        assert_eq!(parse_cents("75"), Ok(7500));
        assert_eq!(parse_cents("12.34"), Ok(1234));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents("0.01"), Ok(1));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("-75.50"), Ok(-7550));
        assert_eq!(parse_cents("100.999"), Ok(10099)); // Truncates
        assert_eq!(parse_cents("  40.00  "), Ok(4000));
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents("12.34.56").is_err());
        assert!(parse_cents("12,34").is_err());
        assert!(parse_cents("").is_err());
    }
}
