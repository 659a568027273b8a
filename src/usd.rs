use anyhow::bail;
use serde::{Serialize, Serializer};
use serde_with::DeserializeFromStr;

use std::{
    fmt::{Debug, Display},
    iter::Sum,
    ops::{Add, AddAssign, Mul, Sub},
    str::FromStr,
};

/// Represents an amount of money in USD currency.
///
/// The amount is stored internally as an integer number of cents, but the
/// [`Display`] implementation formats it for display as dollars to 2 decimal
/// places.
///
/// Parsing accepts the currency junk found in real seller exports: a leading
/// `$`, thousands separators, and surrounding whitespace. `1,234.5` parses as
/// 1234 dollars 50 cents; amounts with more than two decimal places are
/// rejected rather than silently rounded.
#[derive(Clone, Copy, Default, DeserializeFromStr, Eq, PartialEq, Ord, PartialOrd)]
pub struct Usd(i64);

impl Usd {
    pub const ZERO: Usd = Usd(0);

    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub fn cents(self) -> i64 {
        self.0
    }

    /// The amount as a floating-point number of dollars, for spreadsheet
    /// cells and ratio arithmetic.
    #[must_use]
    pub fn to_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// This amount divided by `denom`, as a plain ratio.
    ///
    /// Returns 0.0 when `denom` is zero, so margin-style calculations never
    /// divide by zero.
    #[must_use]
    pub fn ratio(self, denom: Usd) -> f64 {
        if denom.0 == 0 {
            0.0
        } else {
            self.0 as f64 / denom.0 as f64
        }
    }
}

impl Debug for Usd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Usd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 as f64 / 100.0;
        write!(f, "${dollars:.2}")
    }
}

impl FromStr for Usd {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | ' '))
            .collect();
        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            bail!("empty amount: {s:?}");
        }
        if frac.len() > 2 {
            bail!("too many decimal places in amount: {s:?}");
        }
        let dollars: i64 = if whole.is_empty() { 0 } else { whole.parse()? };
        let padded = format!("{frac:0<2}");
        let cents_part: i64 = padded.parse()?;
        let cents = dollars * 100 + cents_part;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Serialize for Usd {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_dollars())
    }
}

impl Add for Usd {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Usd {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Usd {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<i64> for Usd {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Usd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_fn_parses_plain_amounts() {
        assert_eq!(Usd::from_str("79.99").unwrap(), Usd::from_cents(7999));
        assert_eq!(Usd::from_str("100").unwrap(), Usd::from_cents(10000));
        assert_eq!(Usd::from_str("0.5").unwrap(), Usd::from_cents(50));
        assert_eq!(Usd::from_str(".75").unwrap(), Usd::from_cents(75));
    }

    #[test]
    fn from_str_fn_strips_currency_symbols_and_separators() {
        assert_eq!(Usd::from_str("$3,409.15").unwrap(), Usd::from_cents(340915));
        assert_eq!(Usd::from_str(" $12 ").unwrap(), Usd::from_cents(1200));
        assert_eq!(Usd::from_str("-$4.20").unwrap(), Usd::from_cents(-420));
    }

    #[test]
    fn from_str_fn_rejects_garbage() {
        assert!(Usd::from_str("").is_err());
        assert!(Usd::from_str("$").is_err());
        assert!(Usd::from_str("twelve").is_err());
        assert!(Usd::from_str("1.234").is_err());
    }

    #[test]
    fn display_formats_as_dollars() {
        assert_eq!(Usd::from_cents(340915).to_string(), "$3409.15");
        assert_eq!(Usd::from_cents(5).to_string(), "$0.05");
    }

    #[test]
    fn ratio_fn_returns_zero_for_zero_denominator() {
        assert_eq!(Usd::from_cents(3000).ratio(Usd::ZERO), 0.0);
        assert_eq!(Usd::from_cents(3000).ratio(Usd::from_cents(10000)), 0.3);
    }

    #[test]
    fn arithmetic_works_in_cents() {
        let price = Usd::from_cents(1999);
        assert_eq!(price * 3, Usd::from_cents(5997));
        assert_eq!(
            Usd::from_cents(10000) - Usd::from_cents(6000) - Usd::from_cents(1000),
            Usd::from_cents(3000)
        );
        let total: Usd = [price, price].into_iter().sum();
        assert_eq!(total, Usd::from_cents(3998));
    }
}
