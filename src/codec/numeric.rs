use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, ToBigInt};
use num_traits::ToPrimitive;

use crate::error::{Error, Result};

/// Result of [`parse_numeric`]: the smallest representation that holds
/// the input exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Big(BigInt),
    F64(f64),
    Dec(BigDecimal),
}

impl Numeric {
    /// The value as an `i64` when it is an integer that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::Big(v) => v.to_i64(),
            Self::F64(_) | Self::Dec(_) => None,
        }
    }

    /// The value as an arbitrary-precision integer when it is integral.
    #[must_use]
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Self::I8(v) => Some(BigInt::from(*v)),
            Self::I16(v) => Some(BigInt::from(*v)),
            Self::I32(v) => Some(BigInt::from(*v)),
            Self::I64(v) => Some(BigInt::from(*v)),
            Self::Big(v) => Some(v.clone()),
            Self::F64(_) | Self::Dec(_) => None,
        }
    }

    /// The value as an arbitrary-precision decimal. Always succeeds.
    #[must_use]
    pub fn to_decimal(&self) -> BigDecimal {
        match self {
            Self::I8(v) => BigDecimal::from(i64::from(*v)),
            Self::I16(v) => BigDecimal::from(i64::from(*v)),
            Self::I32(v) => BigDecimal::from(i64::from(*v)),
            Self::I64(v) => BigDecimal::from(*v),
            Self::Big(v) => BigDecimal::from(v.clone()),
            Self::F64(v) => {
                // The shortest-representation string is the canonical
                // form here, not the exact binary expansion.
                BigDecimal::from_str(&v.to_string()).unwrap_or_default()
            }
            Self::Dec(v) => v.clone(),
        }
    }
}

enum Shape {
    Integer,
    Fractional,
}

/// Classifies and parses a numeric string.
///
/// A single pass rejects ill-placed signs, double dots, and any
/// non-digit outside the exponent. Pure integers down-cast to the
/// smallest exactly fitting width, overflowing into an
/// arbitrary-precision integer. Decimals and exponentials parse as
/// arbitrary-precision decimals, down-cast to an integer when exact,
/// and fall back to `f64` when the shortest double representation
/// round-trips losslessly.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] when the input is empty or not a
/// number.
pub fn parse_numeric(input: &str) -> Result<Numeric> {
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid(input));
    }
    match classify(s) {
        Some(Shape::Integer) => Ok(parse_integer(s)),
        Some(Shape::Fractional) => parse_fractional(input, s),
        None => Err(invalid(input)),
    }
}

fn invalid(input: &str) -> Error {
    Error::type_mismatch(format!("Invalid numeric value: {input}"))
}

fn classify(s: &str) -> Option<Shape> {
    let bytes = s.as_bytes();
    let mut saw_digit = false;
    let mut saw_dot = false;
    let mut saw_exp = false;
    let mut exp_digit = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'+' | b'-' => {
                // Only at the very start or directly after the exponent
                // marker.
                let after_exp = i > 0 && matches!(bytes[i - 1], b'e' | b'E');
                if i != 0 && !after_exp {
                    return None;
                }
            }
            b'.' => {
                if saw_dot || saw_exp {
                    return None;
                }
                saw_dot = true;
            }
            b'e' | b'E' => {
                if saw_exp || !saw_digit {
                    return None;
                }
                saw_exp = true;
            }
            b'0'..=b'9' => {
                if saw_exp {
                    exp_digit = true;
                } else {
                    saw_digit = true;
                }
            }
            _ => return None,
        }
        i += 1;
    }
    if !saw_digit || (saw_exp && !exp_digit) {
        return None;
    }
    if saw_dot || saw_exp {
        Some(Shape::Fractional)
    } else {
        Some(Shape::Integer)
    }
}

fn parse_integer(s: &str) -> Numeric {
    s.parse::<i64>().map_or_else(
        // Overflowed a long: keep it exact.
        |_| Numeric::Big(BigInt::from_str(s).expect("classified integer")),
        downcast_i64,
    )
}

const fn downcast_i64(v: i64) -> Numeric {
    if v >= i8::MIN as i64 && v <= i8::MAX as i64 {
        Numeric::I8(v as i8)
    } else if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
        Numeric::I16(v as i16)
    } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
        Numeric::I32(v as i32)
    } else {
        Numeric::I64(v)
    }
}

fn parse_fractional(input: &str, s: &str) -> Result<Numeric> {
    let dec = BigDecimal::from_str(s).map_err(|_| invalid(input))?;
    if dec.is_integer() {
        let int = dec.to_bigint().ok_or_else(|| invalid(input))?;
        return Ok(Numeric::Big(int));
    }
    // The shortest double form only wins when it reproduces the input
    // digits exactly; otherwise the decimal keeps its scale ("10.50"
    // stays 10.50).
    if let Some(f) = dec.to_f64()
        && f.is_finite()
        && f.to_string() == dec.to_string()
    {
        return Ok(Numeric::F64(f));
    }
    Ok(Numeric::Dec(dec))
}

/// Canonical text for an arbitrary-precision decimal, choosing the
/// smallest representation that renders identically: the integer when
/// the value is whole, the shortest double form when it round-trips,
/// otherwise the plain decimal string.
#[must_use]
pub fn canonical_decimal(dec: &BigDecimal) -> String {
    let normalized = dec.clone().normalized();
    if dec.is_integer()
        && let Some(int) = dec.to_bigint()
    {
        let int_str = int.to_string();
        if normalized.to_string() == int_str {
            return int_str;
        }
    }
    if let Some(f) = normalized.to_f64()
        && f.is_finite()
    {
        let via_double = f.to_string();
        if via_double == normalized.to_string() {
            return via_double;
        }
    }
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_downcast_ladder() {
        assert_eq!(parse_numeric("127").unwrap(), Numeric::I8(127));
        assert_eq!(parse_numeric("128").unwrap(), Numeric::I16(128));
        assert_eq!(parse_numeric("-32769").unwrap(), Numeric::I32(-32769));
        assert_eq!(
            parse_numeric("2147483648").unwrap(),
            Numeric::I64(2_147_483_648)
        );
        assert_eq!(
            parse_numeric("99999999999999999999").unwrap(),
            Numeric::Big(BigInt::from_str("99999999999999999999").unwrap())
        );
    }

    #[test]
    fn signs_accepted_once() {
        assert_eq!(parse_numeric("+5").unwrap(), Numeric::I8(5));
        assert_eq!(parse_numeric("-5").unwrap(), Numeric::I8(-5));
        assert!(parse_numeric("--5").is_err());
        assert!(parse_numeric("5-").is_err());
    }

    #[test]
    fn fractional_shapes() {
        assert_eq!(parse_numeric("3.14").unwrap(), Numeric::F64(3.14));
        assert_eq!(
            parse_numeric("1e2").unwrap(),
            Numeric::Big(BigInt::from(100))
        );
        assert_eq!(parse_numeric("1.5e-3").unwrap(), Numeric::F64(0.0015));
        // A trailing zero is not reproducible through a double, so the
        // exact decimal is kept; encode normalises it later.
        match parse_numeric("3.140").unwrap() {
            Numeric::Dec(d) => assert_eq!(d.to_string(), "3.140"),
            other => panic!("expected decimal, got {other:?}"),
        }
        assert_eq!(canonical_decimal(&"3.140".parse().unwrap()), "3.14");
    }

    #[test]
    fn high_precision_stays_decimal() {
        let got = parse_numeric("3.141592653589793238462643").unwrap();
        match got {
            Numeric::Dec(d) => {
                assert_eq!(d.to_string(), "3.141592653589793238462643");
            }
            other => panic!("expected decimal, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "   ", "1.2.3", "1e", "e5", "12a", ".", "1 2", "not_a_number"] {
            assert!(parse_numeric(bad).is_err(), "expected failure for {bad:?}");
        }
        let err = parse_numeric("not_a_number").unwrap_err();
        assert_eq!(err.to_string(), "Invalid numeric value: not_a_number");
    }

    #[test]
    fn canonical_forms() {
        let d = |s: &str| BigDecimal::from_str(s).unwrap();
        assert_eq!(canonical_decimal(&d("3.14")), "3.14");
        assert_eq!(canonical_decimal(&d("3.140")), "3.14");
        assert_eq!(canonical_decimal(&d("1e2")), "100");
        assert_eq!(canonical_decimal(&d("100")), "100");
        assert_eq!(
            canonical_decimal(&d("3.141592653589793238462643")),
            "3.141592653589793238462643"
        );
    }
}
