//! Precision-tracked arbitrary-precision decimal.
//!
//! Precision is part of value identity: `42.00` and `42.000` hold the same
//! magnitude but are not equal, and arithmetic results carry the precision
//! their operands justify. The magnitude itself is exact (digit string plus
//! decimal-point position), so unit conversion factors never lose digits.

use crate::error::{Error, Result};
use num_bigint::{BigInt, BigUint, Sign};
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;

/// Upper bound on significant digits produced by an inexact division.
const DIVISION_MAX_PRECISION: u32 = 25;

#[derive(Debug, Clone)]
pub struct Decimal {
    negative: bool,
    /// Significant digits, no leading zeros. `"0"` only for zero.
    digits: String,
    /// Count of digits before the decimal point. May be negative
    /// (`0.00400` stores digits `400`, decimal `-2`) or exceed
    /// `digits.len()` (trailing whole-number zeros from scientific input).
    decimal: i32,
    precision: u32,
    scientific: bool,
}

impl Decimal {
    pub fn zero() -> Self {
        Self {
            negative: false,
            digits: "0".to_string(),
            decimal: 1,
            precision: 1,
            scientific: false,
        }
    }

    pub fn one() -> Self {
        Self::from_i64(1)
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() || value.chars().any(|c| c.is_whitespace()) {
            return Err(Error::InvalidDecimal(value.to_string()));
        }
        if value.contains('e') || value.contains('E') {
            Self::parse_scientific(value)
        } else {
            Self::parse_plain(value)
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self::parse_plain(&value.to_string()).expect("integer literal is a valid decimal")
    }

    /// Parse `value` and then pin the precision, regardless of how many
    /// significant digits the text carried.
    pub fn parse_with_precision(value: &str, precision: u32) -> Result<Self> {
        let mut d = Self::parse(value)?;
        d.precision = precision.max(1);
        Ok(d)
    }

    fn parse_plain(text: &str) -> Result<Self> {
        let original = text;
        let mut value = text;
        let negative = value.starts_with('-');
        if negative {
            value = &value[1..];
        } else if value.starts_with('+') {
            value = &value[1..];
        }
        if value.is_empty() {
            return Err(Error::InvalidDecimal(original.to_string()));
        }

        let mut s: String = value.to_string();
        while s.starts_with('0') && s.len() > 1 {
            s.remove(0);
        }

        let mut dec: Option<usize> = None;
        for (i, c) in s.chars().enumerate() {
            if c == '.' && dec.is_none() {
                dec = Some(i);
            } else if !c.is_ascii_digit() {
                return Err(Error::InvalidDecimal(original.to_string()));
            }
        }

        let (digits, decimal, precision) = match dec {
            None => {
                let precision = s.len() as u32;
                (s.clone(), s.len() as i32, precision)
            }
            Some(pos) if pos == s.len() - 1 => {
                return Err(Error::InvalidDecimal(original.to_string()))
            }
            Some(pos) => {
                let mut digits: String = s.chars().filter(|c| *c != '.').collect();
                let mut decimal = pos as i32;
                let precision = count_significants(&s);
                if digits.chars().all(|c| c == '0') {
                    // A literal zero such as "0.00" keeps its written scale.
                    return Ok(Self {
                        negative: false,
                        digits: "0".to_string(),
                        decimal: 1,
                        precision: precision.max(1),
                        scientific: false,
                    });
                }
                while digits.starts_with('0') {
                    digits.remove(0);
                    decimal -= 1;
                }
                (digits, decimal, precision)
            }
        };

        if digits == "0" {
            return Ok(Self::zero());
        }

        Ok(Self {
            negative,
            digits,
            decimal,
            precision: precision.max(1),
            scientific: false,
        })
    }

    fn parse_scientific(text: &str) -> Result<Self> {
        let split = text
            .find(['e', 'E'])
            .ok_or_else(|| Error::InvalidDecimal(text.to_string()))?;
        let mantissa = &text[..split];
        let exponent: i32 = text[split + 1..]
            .parse()
            .map_err(|_| Error::InvalidDecimal(text.to_string()))?;
        let mut d = Self::parse_plain(mantissa)?;
        if !d.is_zero() {
            d.decimal += exponent;
        }
        d.scientific = true;
        Ok(d)
    }

    pub fn is_zero(&self) -> bool {
        self.digits == "0"
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// True when there are no stored fractional digits.
    pub fn is_whole_number(&self) -> bool {
        self.decimal >= self.digits.len() as i32
    }

    /// Exponent of the least significant stored digit
    /// (`8000` → 0 when stored as four digits, `0.25` → -2).
    fn exponent(&self) -> i32 {
        self.decimal - self.digits.len() as i32
    }

    fn coefficient(&self) -> BigInt {
        let mag: BigUint = self.digits.parse().expect("digits are ascii numerals");
        if self.negative {
            BigInt::from_biguint(Sign::Minus, mag)
        } else {
            BigInt::from_biguint(Sign::Plus, mag)
        }
    }

    fn from_parts(coefficient: BigInt, exponent: i32, precision: u32, scientific: bool) -> Self {
        if coefficient.is_zero() {
            let mut z = Self::zero();
            z.precision = precision.max(1);
            return z;
        }
        let negative = coefficient.is_negative();
        let digits = coefficient.abs().to_string();
        let decimal = digits.len() as i32 + exponent;
        Self {
            negative,
            digits,
            decimal,
            precision: precision.max(1),
            scientific,
        }
    }

    /// Drop trailing fractional zeros (`8000.0` → `8000`), keeping the
    /// magnitude intact. Used on computed results only; parsed literals
    /// keep their written scale.
    fn normalized(mut coefficient: BigInt, mut exponent: i32) -> (BigInt, i32) {
        let ten = BigInt::from(10);
        while exponent < 0 && !coefficient.is_zero() && (&coefficient % &ten).is_zero() {
            coefficient /= &ten;
            exponent += 1;
        }
        (coefficient, exponent)
    }

    pub fn add(&self, other: &Decimal) -> Decimal {
        let e = self.exponent().min(other.exponent());
        let a = &self.coefficient() * pow10((self.exponent() - e) as u32);
        let b = &other.coefficient() * pow10((other.exponent() - e) as u32);
        Self::from_parts(
            a + b,
            e,
            self.precision.min(other.precision),
            self.scientific || other.scientific,
        )
    }

    pub fn subtract(&self, other: &Decimal) -> Decimal {
        self.add(&other.negated())
    }

    pub fn negated(&self) -> Decimal {
        let mut d = self.clone();
        if !d.is_zero() {
            d.negative = !d.negative;
        }
        d
    }

    pub fn multiply(&self, other: &Decimal) -> Decimal {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let coefficient = self.coefficient() * other.coefficient();
        let exponent = self.exponent() + other.exponent();
        let (coefficient, exponent) = Self::normalized(coefficient, exponent);

        let precision = match (self.is_whole_number(), other.is_whole_number()) {
            (true, true) => coefficient.abs().to_string().len() as u32,
            (true, false) => other.precision,
            (false, true) => self.precision,
            (false, false) => self.precision.min(other.precision),
        };
        Self::from_parts(
            coefficient,
            exponent,
            precision,
            self.scientific || other.scientific,
        )
    }

    pub fn divide(&self, other: &Decimal) -> Result<Decimal> {
        if other.is_zero() {
            return Err(Error::DivideByZero(self.as_decimal()));
        }
        if self.is_zero() {
            return Ok(Self::zero());
        }

        let precision = match (self.is_whole_number(), other.is_whole_number()) {
            (true, true) => self.precision.max(other.precision),
            (true, false) => other.precision,
            (false, true) => self.precision,
            (false, false) => self.precision.min(other.precision),
        }
        .min(DIVISION_MAX_PRECISION);

        let numerator = self.coefficient();
        let denominator = other.coefficient();
        // Enough working digits to expose `precision` significant digits
        // plus a rounding guard.
        let guard = precision as usize + denominator.abs().to_string().len() + 2;
        let scaled = numerator * pow10(guard as u32);
        let quotient = &scaled / &denominator;
        let remainder = &scaled % &denominator;
        let exponent = self.exponent() - other.exponent() - guard as i32;

        if remainder.is_zero() {
            let (q, e) = Self::normalized(quotient, exponent);
            return Ok(Self::from_parts(
                q,
                e,
                precision,
                self.scientific || other.scientific,
            ));
        }

        let (rounded, exponent) = round_significant(quotient, exponent, precision);
        Ok(Self::from_parts(
            rounded,
            exponent,
            precision,
            self.scientific || other.scientific,
        ))
    }

    /// Numeric ordering, ignoring precision.
    pub fn compares_to(&self, other: &Decimal) -> Ordering {
        let e = self.exponent().min(other.exponent());
        let a = &self.coefficient() * pow10((self.exponent() - e) as u32);
        let b = &other.coefficient() * pow10((other.exponent() - e) as u32);
        a.cmp(&b)
    }

    /// Exact equality, including precision (`42.00` ≠ `42.000`).
    pub fn equals(&self, other: &Decimal) -> bool {
        self.negative == other.negative
            && self.digits == other.digits
            && self.decimal == other.decimal
            && self.precision == other.precision
    }

    pub fn as_decimal(&self) -> String {
        let mut result = self.digits.clone();
        let len = result.len() as i32;
        if self.decimal != len {
            if self.decimal <= 0 {
                result = format!("0.{}{}", "0".repeat((-self.decimal) as usize), result);
            } else if self.decimal < len {
                result.insert(self.decimal as usize, '.');
            } else {
                result.push_str(&"0".repeat((self.decimal - len) as usize));
            }
        }
        if self.negative && result.chars().any(|c| c != '0' && c != '.') {
            result.insert(0, '-');
        }
        result
    }

    pub fn as_scientific(&self) -> String {
        if self.is_zero() {
            return "0e0".to_string();
        }
        let mut mantissa = self.digits.clone();
        if mantissa.len() > 1 {
            mantissa.insert(1, '.');
        }
        let mut out = format!("{}e{}", mantissa, self.decimal - 1);
        if self.negative {
            out.insert(0, '-');
        }
        out
    }

    pub fn to_rational(&self) -> BigRational {
        let coefficient = self.coefficient();
        let e = self.exponent();
        if e >= 0 {
            BigRational::new(coefficient * pow10(e as u32), BigInt::one())
        } else {
            BigRational::new(coefficient, pow10((-e) as u32))
        }
    }

    /// Build a decimal from an exact rational. Terminating expansions keep
    /// all their digits; non-terminating ones are rounded half-up at
    /// `max_precision` significant digits.
    pub fn from_rational(value: &BigRational, max_precision: u32) -> Decimal {
        if value.numer().is_zero() {
            return Self::zero();
        }
        let mut denom = value.denom().abs();
        // Strip factors of 10, then 2 and 5: what remains decides whether
        // the expansion terminates.
        let mut shift = 0i32;
        let two = BigInt::from(2);
        let five = BigInt::from(5);
        let mut twos = 0u32;
        let mut fives = 0u32;
        while (&denom % &two).is_zero() {
            denom /= &two;
            twos += 1;
        }
        while (&denom % &five).is_zero() {
            denom /= &five;
            fives += 1;
        }
        if denom.is_one() {
            // Terminating: numer / (2^a 5^b) = numer * 2^(m-a) 5^(m-b) / 10^m
            let m = twos.max(fives);
            let mut coefficient = value.numer().clone();
            coefficient *= two.pow(m - twos);
            coefficient *= five.pow(m - fives);
            shift -= m as i32;
            let (c, e) = Self::normalized(coefficient, shift);
            let precision = c.abs().to_string().len() as u32;
            return Self::from_parts(c, e, precision, false);
        }

        // Non-terminating: scale up and round.
        let guard = max_precision as usize + value.denom().abs().to_string().len() + 2;
        let scaled = value.numer() * pow10(guard as u32);
        let quotient = scaled / value.denom();
        let (rounded, exponent) = round_significant(quotient, -(guard as i32), max_precision);
        Self::from_parts(rounded, exponent, max_precision, false)
    }
}

fn pow10(n: u32) -> BigInt {
    BigInt::from(10).pow(n)
}

/// Round `coefficient × 10^exponent` half-up to `precision` significant
/// digits.
fn round_significant(coefficient: BigInt, exponent: i32, precision: u32) -> (BigInt, i32) {
    let digits = coefficient.abs().to_string();
    let len = digits.len() as u32;
    if len <= precision {
        return (coefficient, exponent);
    }
    let drop = len - precision;
    let negative = coefficient.is_negative();
    let mut kept = coefficient.abs() / pow10(drop);
    let half_marker: BigInt = (coefficient.abs() / pow10(drop - 1)) % BigInt::from(10);
    if half_marker >= BigInt::from(5) {
        kept += BigInt::one();
    }
    if negative {
        kept = -kept;
    }
    (kept, exponent + drop as i32)
}

fn count_significants(value: &str) -> u32 {
    let mut s: String = value.chars().filter(|c| *c != '.').collect();
    while s.starts_with('0') && s.len() > 1 {
        s.remove(0);
    }
    s.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::parse(s).unwrap()
    }

    #[test]
    fn parses_and_renders() {
        assert_eq!(dec("42").as_decimal(), "42");
        assert_eq!(dec("42.00").as_decimal(), "42.00");
        assert_eq!(dec("0.5").as_decimal(), "0.5");
        assert_eq!(dec("0.00400").as_decimal(), "0.00400");
        assert_eq!(dec("-3.14").as_decimal(), "-3.14");
        assert_eq!(dec("-0").as_decimal(), "0");
    }

    #[test]
    fn precision_from_text() {
        assert_eq!(dec("42").precision(), 2);
        assert_eq!(dec("42.00").precision(), 4);
        assert_eq!(dec("42.000").precision(), 5);
        assert_eq!(dec("0.00400").precision(), 3);
    }

    #[test]
    fn equality_includes_precision() {
        assert!(!dec("42.00").equals(&dec("42.000")));
        assert!(dec("42.00").equals(&dec("42.00")));
        assert_eq!(dec("42.00").compares_to(&dec("42.000")), Ordering::Equal);
    }

    #[test]
    fn scientific_roundtrip() {
        let d = dec("1.5e3");
        assert_eq!(d.as_decimal(), "1500");
        assert_eq!(d.as_scientific(), "1.5e3");
        assert_eq!(dec("2.5e-2").as_decimal(), "0.025");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Decimal::parse("").is_err());
        assert!(Decimal::parse("1. 5").is_err());
        assert!(Decimal::parse("12a").is_err());
        assert!(Decimal::parse("5.").is_err());
    }

    #[test]
    fn addition_and_subtraction() {
        assert_eq!(dec("1.5").add(&dec("2.25")).as_decimal(), "3.75");
        assert_eq!(dec("5").subtract(&dec("7")).as_decimal(), "-2");
        assert_eq!(dec("0.1").add(&dec("0.2")).as_decimal(), "0.3");
    }

    #[test]
    fn multiplication() {
        assert_eq!(dec("2").multiply(&dec("3")).as_decimal(), "6");
        assert_eq!(dec("100").multiply(&dec("0.01")).as_decimal(), "1");
        assert_eq!(dec("1.5").multiply(&dec("1.5")).as_decimal(), "2.25");
    }

    #[test]
    fn division_rounds_to_precision() {
        let result = dec("80.0").multiply(&dec("100")).divide(&dec("81")).unwrap();
        assert_eq!(result.as_decimal(), "98.8");
        assert_eq!(dec("1000").divide(&dec("1000")).unwrap().as_decimal(), "1");
        assert_eq!(dec("15").divide(&dec("60")).unwrap().as_decimal(), "0.25");
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(
            dec("5").divide(&dec("0")),
            Err(Error::DivideByZero(_))
        ));
    }

    #[test]
    fn rational_roundtrip() {
        let r = dec("0.125").to_rational();
        assert_eq!(Decimal::from_rational(&r, 25).as_decimal(), "0.125");

        let third = BigRational::new(BigInt::from(1), BigInt::from(3));
        let d = Decimal::from_rational(&third, 5);
        assert_eq!(d.as_decimal(), "0.33333");
    }
}
