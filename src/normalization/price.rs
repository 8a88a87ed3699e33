//! Price text normalization.
//!
//! Retailer pages render prices in mixed locales: Spanish stores use
//! "1.234,56 €" while eBay uses "$1,234.56". Everything funnels through
//! [`extract_price`] so the rest of the pipeline only ever sees a plain
//! positive decimal.

use anyhow::{anyhow, Result};
use regex::Regex;

/// Parse a price out of raw display text, e.g. "€29,99" -> 29.99.
///
/// Separator disambiguation: when both "." and "," appear, the text is in
/// European format ("." thousands, "," decimal); a lone "," is a decimal
/// separator; otherwise "." is already decimal.
pub fn extract_price(text: &str) -> Result<f64> {
    if text.is_empty() {
        return Err(anyhow!("empty price text"));
    }

    let mut s = text.replace(['€', '$'], "");
    s = s.replace(' ', "");

    if s.contains('.') && s.contains(',') {
        // European "1.349,95": drop thousands dots, comma becomes decimal.
        s = s.replace('.', "");
        s = s.replace(',', ".");
    } else if s.contains(',') {
        s = s.replace(',', ".");
    }

    let re = Regex::new(r"\d+(\.\d+)?").expect("static price regex");
    let token = re
        .find(&s)
        .ok_or_else(|| anyhow!("no valid price found in: {text}"))?
        .as_str();

    let price: f64 = token
        .parse()
        .map_err(|e| anyhow!("cannot parse '{token}' as price: {e}"))?;
    if price <= 0.0 {
        return Err(anyhow!("price must be positive, got {price} in: {text}"));
    }

    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_european_thousands_format() {
        assert_eq!(extract_price("1.349,95").unwrap(), 1349.95);
        assert_eq!(extract_price("1.234.567,89").unwrap(), 1_234_567.89);
    }

    #[test]
    fn parses_comma_decimal_with_currency_symbol() {
        assert_eq!(extract_price("29,99€").unwrap(), 29.99);
        assert_eq!(extract_price("€ 29,99").unwrap(), 29.99);
    }

    #[test]
    fn parses_us_format() {
        assert_eq!(extract_price("$149.99").unwrap(), 149.99);
        assert_eq!(extract_price("149.99").unwrap(), 149.99);
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(extract_price("").is_err());
        assert!(extract_price("abc").is_err());
        assert!(extract_price("€").is_err());
    }

    #[test]
    fn rejects_zero() {
        assert!(extract_price("0,00").is_err());
        assert!(extract_price("$0").is_err());
    }

    #[test]
    fn takes_first_numeric_token() {
        // Trailing junk after the number is ignored.
        assert_eq!(extract_price("19,95 IVA incl.").unwrap(), 19.95);
    }
}
