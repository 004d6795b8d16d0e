use itoa::Buffer as ItoaBuffer;
use num_traits::ToPrimitive;
use ryu::Buffer as RyuBuffer;
use time::{PrimitiveDateTime, UtcOffset};

use crate::error::Result;
use crate::schema::{ColumnDescriptor, TypeTag};
use crate::value::{EncodedCell, Value};

use super::numeric::canonical_decimal;
use super::temporal::Pattern;
use super::{
    CodecConfig, DEFAULT_DATE_FORMAT, DEFAULT_TIME_FORMAT, DEFAULT_TIMESTAMP_FORMAT,
    DEFAULT_TIMESTAMPTZ_FORMAT, binary,
};

/// Vendor class prefix for the driver that reports DATE columns as
/// timestamps; the fractional suffix is cut for those columns.
const VENDOR_DATE_CLASS: &str = "oracle.sql.DATE";

/// Converts raw cursor values into encoded cells.
///
/// The temporal formatters compile once at construction and live for
/// the codec's lifetime.
pub struct Encoder {
    trim: bool,
    date: Pattern,
    timestamp: Pattern,
    timestamptz: Pattern,
    time: Pattern,
}

impl Encoder {
    /// Builds an encoder from the codec configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when a configured pattern does
    /// not compile.
    pub fn new(config: &CodecConfig) -> Result<Self> {
        let date = Pattern::new(config.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT))?;
        let timestamp = Pattern::new(
            config
                .timestamp_format
                .as_deref()
                .unwrap_or(DEFAULT_TIMESTAMP_FORMAT),
        )?;
        let timestamptz = Pattern::new(
            config
                .timestamptz_format
                .as_deref()
                .unwrap_or(DEFAULT_TIMESTAMPTZ_FORMAT),
        )?;
        let time = Pattern::new(DEFAULT_TIME_FORMAT)?;
        Ok(Self {
            trim: config.trim,
            date,
            timestamp,
            timestamptz,
            time,
        })
    }

    /// Encodes one raw cell according to its column tag.
    ///
    /// A null raw cell always yields [`EncodedCell::Null`], whatever the
    /// tag.
    ///
    /// # Errors
    ///
    /// Returns an error if a temporal value cannot be rendered with the
    /// configured pattern.
    pub fn encode(&self, value: &Value, column: &ColumnDescriptor) -> Result<EncodedCell> {
        if value.is_null() {
            return Ok(EncodedCell::Null);
        }
        let cell = match column.tag {
            TypeTag::Boolean => match value {
                Value::Bool(b) => EncodedCell::Bool(*b),
                Value::Int(v) => EncodedCell::Bool(*v != 0),
                Value::Long(v) => EncodedCell::Bool(*v != 0),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Int => match value {
                Value::Int(v) => EncodedCell::Int(*v),
                Value::Long(v) => EncodedCell::Int(*v as i32),
                Value::Double(v) => EncodedCell::Int(*v as i32),
                Value::Decimal(d) => d
                    .to_i64()
                    .map_or_else(
                        || self.text(canonical_decimal(d)),
                        |v| EncodedCell::Int(v as i32),
                    ),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Long | TypeTag::Double => match value {
                Value::Int(v) => self.text(ItoaBuffer::new().format(*v).to_owned()),
                Value::Long(v) => self.text(ItoaBuffer::new().format(*v).to_owned()),
                Value::Double(v) => self.text(RyuBuffer::new().format(*v).to_owned()),
                Value::Decimal(d) => self.text(canonical_decimal(d)),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Date => match value {
                Value::Date(d) => self.text(self.date.format_date(*d)?),
                Value::DateTime(dt) => self.text(self.date.format_date(dt.date())?),
                Value::ZonedDateTime(odt) => self.text(self.date.format_date(odt.date())?),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Timestamp => match value {
                Value::DateTime(dt) => self.text(self.render_timestamp(*dt, column)?),
                Value::Date(d) => {
                    let dt = PrimitiveDateTime::new(*d, time::Time::MIDNIGHT);
                    self.text(self.render_timestamp(dt, column)?)
                }
                Value::ZonedDateTime(odt) => {
                    let dt = PrimitiveDateTime::new(odt.date(), odt.time());
                    self.text(self.render_timestamp(dt, column)?)
                }
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::TimestampTz => match value {
                Value::ZonedDateTime(odt) => self.text(self.timestamptz.format_zoned(*odt)?),
                // Plain values carry no zone; treat them as system-zone.
                Value::DateTime(dt) => {
                    let odt = dt.assume_offset(system_offset());
                    self.text(self.timestamptz.format_zoned(odt)?)
                }
                Value::Date(d) => {
                    let dt = PrimitiveDateTime::new(*d, time::Time::MIDNIGHT);
                    self.text(self.timestamptz.format_zoned(dt.assume_offset(system_offset()))?)
                }
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Time => match value {
                Value::Time(t) => self.text(self.time.format_time(*t)?),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Raw | TypeTag::Blob => match value {
                Value::Bytes(b) => self.text(binary::to_hex(b)),
                Value::Str(s) => self.text(s.clone()),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Clob | TypeTag::Xml | TypeTag::Json => match value {
                Value::Str(s) => self.text(s.clone()),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Array | TypeTag::Struct => {
                let mut out = String::new();
                self.pretty(value, 0, &mut out)?;
                self.text(out)
            }
            TypeTag::Vector => match value {
                Value::Vector(v) => self.text(render_vector(v)),
                other => self.text(self.generic_text(other)?),
            },
            TypeTag::Object | TypeTag::String => self.text(self.generic_text(value)?),
        };
        Ok(cell)
    }

    fn text(&self, mut s: String) -> EncodedCell {
        if self.trim {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                s = trimmed.to_owned();
            }
        }
        EncodedCell::Text(s)
    }

    /// Canonical text for a value when the tag gives no better rule.
    fn generic_text(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_owned(),
            Value::Int(v) => ItoaBuffer::new().format(*v).to_owned(),
            Value::Long(v) => ItoaBuffer::new().format(*v).to_owned(),
            Value::Double(v) => RyuBuffer::new().format(*v).to_owned(),
            Value::Decimal(d) => canonical_decimal(d),
            Value::Str(s) => s.clone(),
            Value::Bytes(b) => binary::to_hex(b),
            Value::Date(d) => self.date.format_date(*d)?,
            Value::Time(t) => self.time.format_time(*t)?,
            Value::DateTime(dt) => strip_zero_fraction(self.timestamp.format_datetime(*dt)?),
            Value::ZonedDateTime(odt) => self.timestamptz.format_zoned(*odt)?,
            Value::Array(_) | Value::Struct { .. } => {
                let mut out = String::new();
                self.pretty(value, 0, &mut out)?;
                out
            }
            Value::Vector(v) => render_vector(v),
        })
    }

    fn render_timestamp(&self, dt: PrimitiveDateTime, column: &ColumnDescriptor) -> Result<String> {
        let formatted = self.timestamp.format_datetime(dt)?;
        if let Some(class) = column.vendor_class()
            && class.starts_with(VENDOR_DATE_CLASS)
            && let Some(pos) = formatted.rfind('.')
            && pos > 0
        {
            // Driver workaround kept verbatim: the cut lands one byte
            // before the fraction dot.
            return Ok(formatted[..pos - 1].to_owned());
        }
        Ok(strip_zero_fraction(formatted))
    }

    /// Recursive pretty printer for collection and object values:
    /// arrays render as `{e1,e2,…}`, objects as `Type(e1,e2,…)`, nested
    /// composites indent two spaces per level.
    fn pretty(&self, value: &Value, depth: usize, out: &mut String) -> Result<()> {
        match value {
            Value::Array(items) => {
                out.push('{');
                self.pretty_elements(items, depth, out)?;
                out.push('}');
            }
            Value::Struct { type_name, fields } => {
                out.push_str(type_name);
                out.push('(');
                self.pretty_elements(fields, depth, out)?;
                out.push(')');
            }
            Value::Null => out.push_str("null"),
            Value::Str(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
            Value::Decimal(d) => out.push_str(&canonical_decimal(d)),
            Value::Date(d) => {
                out.push('\'');
                out.push_str(&self.date.format_date(*d)?);
                out.push('\'');
            }
            Value::DateTime(dt) => {
                out.push('\'');
                out.push_str(&strip_zero_fraction(self.timestamp.format_datetime(*dt)?));
                out.push('\'');
            }
            Value::ZonedDateTime(odt) => {
                out.push('\'');
                out.push_str(&self.timestamptz.format_zoned(*odt)?);
                out.push('\'');
            }
            other => out.push_str(&self.generic_text(other)?),
        }
        Ok(())
    }

    fn pretty_elements(&self, items: &[Value], depth: usize, out: &mut String) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if matches!(item, Value::Array(_) | Value::Struct { .. }) {
                out.push('\n');
                for _ in 0..=depth {
                    out.push_str("  ");
                }
            }
            self.pretty(item, depth + 1, out)?;
        }
        Ok(())
    }
}

/// Strips a trailing all-zero fractional group (`.0`, `.000`, …).
fn strip_zero_fraction(s: String) -> String {
    if let Some(pos) = s.rfind('.') {
        let tail = &s[pos + 1..];
        if !tail.is_empty() && tail.bytes().all(|b| b == b'0') {
            return s[..pos].to_owned();
        }
    }
    s
}

/// `[v0,v1,…]` with a line break after every fourth element.
fn render_vector(values: &[f64]) -> String {
    let mut out = String::with_capacity(values.len() * 8 + 2);
    let mut ryu = RyuBuffer::new();
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
            if i % 4 == 0 {
                out.push('\n');
            }
        }
        out.push_str(ryu.format(*v));
    }
    out.push(']');
    out
}

fn system_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Encodes a whole raw row.
///
/// # Errors
///
/// Propagates the first cell-level encoding failure.
pub fn encode_row(
    encoder: &Encoder,
    row: &[Value],
    columns: &[ColumnDescriptor],
) -> Result<Vec<EncodedCell>> {
    row.iter()
        .zip(columns)
        .map(|(value, column)| encoder.encode(value, column))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::type_code;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use time::macros::{date, datetime};

    fn col(tag_code: i32) -> ColumnDescriptor {
        ColumnDescriptor::new(0, "C".into(), tag_code, 0)
    }

    fn encoder() -> Encoder {
        Encoder::new(&CodecConfig::default()).unwrap()
    }

    #[test]
    fn null_always_encodes_null() {
        let e = encoder();
        for code in [type_code::VARCHAR, type_code::INTEGER, type_code::BLOB] {
            assert_eq!(e.encode(&Value::Null, &col(code)).unwrap(), EncodedCell::Null);
        }
    }

    #[test]
    fn booleans_pass_through() {
        let e = encoder();
        assert_eq!(
            e.encode(&Value::Bool(true), &col(type_code::BOOLEAN)).unwrap(),
            EncodedCell::Bool(true)
        );
    }

    #[test]
    fn decimal_normalisation_picks_smallest_form() {
        let e = encoder();
        let c = col(type_code::DECIMAL);
        let enc = |s: &str| {
            e.encode(&Value::Decimal(BigDecimal::from_str(s).unwrap()), &c)
                .unwrap()
        };
        assert_eq!(enc("100.00"), EncodedCell::Text("100".into()));
        assert_eq!(enc("3.140"), EncodedCell::Text("3.14".into()));
        assert_eq!(
            enc("3.141592653589793238462643"),
            EncodedCell::Text("3.141592653589793238462643".into())
        );
    }

    #[test]
    fn timestamp_strips_zero_fraction() {
        let e = encoder();
        let c = col(type_code::TIMESTAMP);
        assert_eq!(
            e.encode(&Value::DateTime(datetime!(2024-01-02 03:04:05)), &c)
                .unwrap(),
            EncodedCell::Text("2024-01-02 03:04:05".into())
        );
        assert_eq!(
            e.encode(&Value::DateTime(datetime!(2024-01-02 03:04:05.678)), &c)
                .unwrap(),
            EncodedCell::Text("2024-01-02 03:04:05.678".into())
        );
    }

    #[test]
    fn vendor_date_class_truncates_before_the_dot() {
        let e = encoder();
        let c = col(type_code::TIMESTAMP);
        c.note_vendor_class("oracle.sql.DATE");
        assert_eq!(
            e.encode(&Value::DateTime(datetime!(2024-01-02 03:04:05.678)), &c)
                .unwrap(),
            // The cut deliberately lands one byte before the dot.
            EncodedCell::Text("2024-01-02 03:04:0".into())
        );
    }

    #[test]
    fn date_uses_configured_pattern() {
        let config = CodecConfig::default().with_date_format("dd/MM/yyyy");
        let e = Encoder::new(&config).unwrap();
        assert_eq!(
            e.encode(&Value::Date(date!(2024 - 01 - 02)), &col(type_code::DATE))
                .unwrap(),
            EncodedCell::Text("02/01/2024".into())
        );
    }

    #[test]
    fn raw_renders_upper_hex() {
        let e = encoder();
        assert_eq!(
            e.encode(&Value::Bytes(vec![0xDE, 0xAD]), &col(type_code::BINARY))
                .unwrap(),
            EncodedCell::Text("DEAD".into())
        );
    }

    #[test]
    fn arrays_and_structs_pretty_print() {
        let e = encoder();
        let value = Value::Array(vec![
            Value::Int(1),
            Value::Str("it's".into()),
            Value::Struct {
                type_name: "POINT".into(),
                fields: vec![Value::Int(3), Value::Int(4)],
            },
        ]);
        let got = e.encode(&value, &col(type_code::ARRAY)).unwrap();
        assert_eq!(
            got,
            EncodedCell::Text("{1,'it''s',\n  POINT(3,4)}".into())
        );
    }

    #[test]
    fn vector_breaks_every_four() {
        let e = encoder();
        let value = Value::Vector(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let got = e.encode(&value, &col(type_code::VECTOR)).unwrap();
        assert_eq!(
            got,
            EncodedCell::Text("[1.0,2.0,3.0,4.0,\n5.0]".into())
        );
    }

    #[test]
    fn trim_applies_to_text() {
        let config = CodecConfig::default().with_trim(true);
        let e = Encoder::new(&config).unwrap();
        assert_eq!(
            e.encode(&Value::Str("  padded  ".into()), &col(type_code::VARCHAR))
                .unwrap(),
            EncodedCell::Text("padded".into())
        );
    }
}
