use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use time::{PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Error, Result};
use crate::schema::SqlType;
use crate::value::Param;

use super::numeric::{Numeric, parse_numeric};
use super::temporal::{Temporal, TemporalFormats};
use super::{CodecConfig, binary};

/// Converts CSV field text into typed parameters for binding.
///
/// Owns the live temporal-format maps and the per-load runtime caches;
/// call [`note_row`](Decoder::note_row) between rows so cache
/// compaction happens at a quiescent point.
pub struct Decoder {
    unescape_newline: bool,
    datetimes: TemporalFormats,
    times: TemporalFormats,
    rows_decoded: u64,
}

impl Decoder {
    /// Builds a decoder from the codec configuration. Pinned temporal
    /// formats replace the corresponding detection library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured pattern does not
    /// compile.
    pub fn new(config: &CodecConfig) -> Result<Self> {
        let pins: Vec<&String> = [
            config.date_format.as_ref(),
            config.timestamp_format.as_ref(),
            config.timestamptz_format.as_ref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        let datetimes = if pins.is_empty() {
            TemporalFormats::datetime()
        } else {
            let mut formats = TemporalFormats::pinned(pins[0])?;
            for key in &pins[1..] {
                formats = formats.with_pattern(key)?;
            }
            formats
        };
        Ok(Self {
            unescape_newline: config.unescape_newline,
            datetimes,
            times: TemporalFormats::time_only(),
            rows_decoded: 0,
        })
    }

    /// Marks the end of a row: bumps the row counter and compacts the
    /// temporal caches once warmed up.
    pub fn note_row(&mut self) {
        self.rows_decoded += 1;
        self.datetimes.maybe_compact(self.rows_decoded);
        self.times.maybe_compact(self.rows_decoded);
    }

    /// Whether either temporal cache has been compacted.
    #[must_use]
    pub const fn caches_compacted(&self) -> bool {
        self.datetimes.is_compacted() || self.times.is_compacted()
    }

    /// Decodes one field for its target SQL type.
    ///
    /// Empty and all-whitespace input binds NULL for every target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when the text cannot be decoded
    /// for the target type.
    pub fn decode(&mut self, text: &str, target: SqlType) -> Result<Param> {
        if text.trim().is_empty() {
            return Ok(Param::Null);
        }
        match target {
            SqlType::Char | SqlType::Varchar | SqlType::Clob => Ok(self.character(text)),
            SqlType::TinyInt => self.integer(text, i64::from(i8::MIN), i64::from(i8::MAX), "TINYINT"),
            SqlType::SmallInt => {
                self.integer(text, i64::from(i16::MIN), i64::from(i16::MAX), "SMALLINT")
            }
            SqlType::Integer => {
                self.integer(text, i64::from(i32::MIN), i64::from(i32::MAX), "INTEGER")
            }
            SqlType::BigInt => self.integer(text, i64::MIN, i64::MAX, "BIGINT"),
            SqlType::Decimal => Ok(Param::Decimal(parse_numeric(text)?.to_decimal())),
            SqlType::Real => self.real(text),
            SqlType::Double => self.double(text),
            SqlType::Date => self.temporal(text, target),
            SqlType::Time | SqlType::TimeTz => self.temporal(text, target),
            SqlType::Timestamp | SqlType::TimestampTz => self.temporal(text, target),
            SqlType::Boolean => boolean(text),
            SqlType::Binary => Ok(Param::Bytes(binary::parse_binary(text)?)),
            SqlType::Other => Ok(Param::Str(text.to_owned())),
        }
    }

    fn character(&self, text: &str) -> Param {
        if self.unescape_newline && (text.contains("\\n") || text.contains("\\r")) {
            Param::Str(text.replace("\\n", "\n").replace("\\r", "\r"))
        } else {
            Param::Str(text.to_owned())
        }
    }

    fn integer(&self, text: &str, min: i64, max: i64, type_name: &str) -> Result<Param> {
        let numeric = parse_numeric(text)?;
        let Some(v) = numeric.as_i64() else {
            return Err(out_of_range(text, type_name));
        };
        if v < min || v > max {
            return Err(out_of_range(text, type_name));
        }
        Ok(match (min, max) {
            _ if max == i64::from(i8::MAX) => Param::I8(v as i8),
            _ if max == i64::from(i16::MAX) => Param::I16(v as i16),
            _ if max == i64::from(i32::MAX) => Param::I32(v as i32),
            _ => Param::I64(v),
        })
    }

    fn real(&self, text: &str) -> Result<Param> {
        match float_of(&parse_numeric(text)?) {
            Some(f) => {
                let narrowed = f as f32;
                if f64::from(narrowed) == f {
                    Ok(Param::F32(narrowed))
                } else {
                    Err(out_of_range(text, "REAL"))
                }
            }
            None => Err(out_of_range(text, "REAL")),
        }
    }

    fn double(&self, text: &str) -> Result<Param> {
        float_of(&parse_numeric(text)?)
            .map(Param::F64)
            .ok_or_else(|| out_of_range(text, "DOUBLE"))
    }

    fn temporal(&mut self, text: &str, target: SqlType) -> Result<Param> {
        let value = if matches!(target, SqlType::Time | SqlType::TimeTz) {
            self.times.parse(text)
        } else {
            self.datetimes.parse(text)
        };
        let Some(value) = value else {
            return Err(Error::type_mismatch(format!(
                "Invalid {} value: {text}",
                temporal_name(target)
            )));
        };
        Ok(promote(value, target))
    }
}

/// Fixed promotion ladder from a parsed temporal to the target type.
fn promote(value: Temporal, target: SqlType) -> Param {
    match target {
        SqlType::Date => match value {
            Temporal::Date(d) => Param::Date(d),
            Temporal::DateTime(dt) => Param::Date(dt.date()),
            Temporal::Zoned(odt) => Param::Date(odt.date()),
            Temporal::Time(_) | Temporal::TimeTz(_, _) => Param::Null,
        },
        SqlType::Timestamp => match value {
            Temporal::Date(d) => Param::Timestamp(PrimitiveDateTime::new(d, Time::MIDNIGHT)),
            Temporal::DateTime(dt) => Param::Timestamp(dt),
            Temporal::Zoned(odt) => {
                let utc = odt.to_offset(UtcOffset::UTC);
                Param::Timestamp(PrimitiveDateTime::new(utc.date(), utc.time()))
            }
            Temporal::Time(t) | Temporal::TimeTz(t, _) => Param::Time(t),
        },
        SqlType::TimestampTz => match value {
            Temporal::Zoned(odt) => Param::TimestampTz(odt),
            // Zone-less input binds at offset zero so loads stay
            // reproducible across hosts.
            Temporal::DateTime(dt) => Param::TimestampTz(dt.assume_utc()),
            Temporal::Date(d) => {
                Param::TimestampTz(PrimitiveDateTime::new(d, Time::MIDNIGHT).assume_utc())
            }
            Temporal::Time(t) | Temporal::TimeTz(t, _) => Param::Time(t),
        },
        SqlType::Time => match value {
            Temporal::Time(t) | Temporal::TimeTz(t, _) => Param::Time(t),
            Temporal::DateTime(dt) => Param::Time(dt.time()),
            Temporal::Zoned(odt) => Param::Time(odt.time()),
            Temporal::Date(_) => Param::Null,
        },
        SqlType::TimeTz => match value {
            Temporal::TimeTz(t, off) => Param::TimeTz(t, off),
            Temporal::Time(t) => Param::TimeTz(t, UtcOffset::UTC),
            Temporal::DateTime(dt) => Param::TimeTz(dt.time(), UtcOffset::UTC),
            Temporal::Zoned(odt) => Param::TimeTz(odt.time(), odt.offset()),
            Temporal::Date(_) => Param::Null,
        },
        _ => Param::Null,
    }
}

const fn temporal_name(target: SqlType) -> &'static str {
    match target {
        SqlType::Date => "date",
        SqlType::Time => "time",
        SqlType::TimeTz => "time with zone",
        SqlType::TimestampTz => "timestamptz",
        _ => "timestamp",
    }
}

/// The numeric as a lossless `f64`, when possible.
fn float_of(numeric: &Numeric) -> Option<f64> {
    match numeric {
        Numeric::F64(v) => Some(*v),
        Numeric::I8(_) | Numeric::I16(_) | Numeric::I32(_) => {
            numeric.as_i64().map(|v| v as f64)
        }
        Numeric::I64(v) => {
            let f = *v as f64;
            (f as i64 == *v).then_some(f)
        }
        Numeric::Big(big) => {
            let f = big.to_f64()?;
            if !f.is_finite() {
                return None;
            }
            (BigInt::from_f64(f).as_ref() == Some(big)).then_some(f)
        }
        Numeric::Dec(_) => None,
    }
}

fn boolean(text: &str) -> Result<Param> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("true")
        || t == "1"
        || t.eq_ignore_ascii_case("yes")
        || t.eq_ignore_ascii_case("y")
    {
        return Ok(Param::Bool(true));
    }
    if t.eq_ignore_ascii_case("false")
        || t == "0"
        || t.eq_ignore_ascii_case("no")
        || t.eq_ignore_ascii_case("n")
    {
        return Ok(Param::Bool(false));
    }
    t.parse::<bool>()
        .map(Param::Bool)
        .map_err(|_| Error::type_mismatch(format!("Invalid boolean value: {text}")))
}

fn out_of_range(text: &str, type_name: &str) -> Error {
    Error::type_mismatch(format!("Numeric value out of range for {type_name}: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use time::macros::{date, datetime, time};

    fn decoder() -> Decoder {
        Decoder::new(&CodecConfig::default()).unwrap()
    }

    #[test]
    fn empty_binds_null_everywhere() {
        let mut d = decoder();
        assert_eq!(d.decode("", SqlType::Integer).unwrap(), Param::Null);
        assert_eq!(d.decode("", SqlType::Varchar).unwrap(), Param::Null);
        assert_eq!(d.decode("   ", SqlType::Varchar).unwrap(), Param::Null);
        assert_eq!(d.decode("", SqlType::Timestamp).unwrap(), Param::Null);
    }

    #[test]
    fn integer_widths() {
        let mut d = decoder();
        assert_eq!(d.decode("127", SqlType::TinyInt).unwrap(), Param::I8(127));
        assert!(d.decode("128", SqlType::TinyInt).is_err());
        assert_eq!(d.decode("128", SqlType::SmallInt).unwrap(), Param::I16(128));
        assert_eq!(
            d.decode("2147483648", SqlType::BigInt).unwrap(),
            Param::I64(2_147_483_648)
        );
        assert!(d.decode("99999999999999999999", SqlType::BigInt).is_err());
    }

    #[test]
    fn decimal_binds_exact() {
        let mut d = decoder();
        assert_eq!(
            d.decode("10.50", SqlType::Decimal).unwrap(),
            Param::Decimal(BigDecimal::from_str("10.50").unwrap())
        );
    }

    #[test]
    fn doubles_require_lossless_round_trip() {
        let mut d = decoder();
        assert_eq!(d.decode("3.14", SqlType::Double).unwrap(), Param::F64(3.14));
        assert_eq!(d.decode("42", SqlType::Double).unwrap(), Param::F64(42.0));
        assert!(d
            .decode("3.141592653589793238462643", SqlType::Double)
            .is_err());
    }

    #[test]
    fn real_narrows_when_exact() {
        let mut d = decoder();
        assert_eq!(d.decode("0.5", SqlType::Real).unwrap(), Param::F32(0.5));
        assert!(d.decode("0.1", SqlType::Real).is_err());
    }

    #[test]
    fn temporal_promotion() {
        let mut d = decoder();
        assert_eq!(
            d.decode("2024-01-02", SqlType::Date).unwrap(),
            Param::Date(date!(2024 - 01 - 02))
        );
        assert_eq!(
            d.decode("2024-01-02 03:04:05", SqlType::Timestamp).unwrap(),
            Param::Timestamp(datetime!(2024-01-02 03:04:05))
        );
        assert_eq!(
            d.decode("2024-01-02 03:04:05+02:00", SqlType::TimestampTz)
                .unwrap(),
            Param::TimestampTz(datetime!(2024-01-02 03:04:05 +02:00))
        );
        assert_eq!(
            d.decode("03:04:05", SqlType::Time).unwrap(),
            Param::Time(time!(03:04:05))
        );
        assert!(d.decode("never", SqlType::Timestamp).is_err());
    }

    #[test]
    fn zoneless_timestamptz_assumes_utc() {
        let mut d = decoder();
        assert_eq!(
            d.decode("2024-01-02 03:04:05", SqlType::TimestampTz).unwrap(),
            Param::TimestampTz(datetime!(2024-01-02 03:04:05 UTC))
        );
    }

    #[test]
    fn booleans() {
        let mut d = decoder();
        for yes in ["TRUE", "true", "1", "YES", "y"] {
            assert_eq!(d.decode(yes, SqlType::Boolean).unwrap(), Param::Bool(true));
        }
        for no in ["FALSE", "0", "No", "n"] {
            assert_eq!(d.decode(no, SqlType::Boolean).unwrap(), Param::Bool(false));
        }
        assert!(d.decode("maybe", SqlType::Boolean).is_err());
    }

    #[test]
    fn binary_and_fallback() {
        let mut d = decoder();
        assert_eq!(
            d.decode("0xDEAD", SqlType::Binary).unwrap(),
            Param::Bytes(vec![0xDE, 0xAD])
        );
        assert_eq!(
            d.decode("anything", SqlType::Other).unwrap(),
            Param::Str("anything".into())
        );
    }

    #[test]
    fn newline_unescaping() {
        let mut d = decoder();
        assert_eq!(
            d.decode("a\\nb", SqlType::Varchar).unwrap(),
            Param::Str("a\nb".into())
        );
        let mut keep = Decoder::new(&CodecConfig {
            unescape_newline: false,
            ..CodecConfig::default()
        })
        .unwrap();
        assert_eq!(
            keep.decode("a\\nb", SqlType::Varchar).unwrap(),
            Param::Str("a\\nb".into())
        );
    }

    #[test]
    fn repeated_decoding_compacts_cache() {
        let mut d = decoder();
        for _ in 0..120 {
            d.decode("2024-03-04 05:06:07", SqlType::Timestamp).unwrap();
            d.note_row();
        }
        assert!(d.caches_compacted());
        assert_eq!(
            d.decode("2024-03-05 06:07:08", SqlType::Timestamp).unwrap(),
            Param::Timestamp(datetime!(2024-03-05 06:07:08))
        );
    }
}
