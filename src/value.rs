use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// A raw typed cell as materialised from a vendor cursor.
///
/// Raw rows cross the prefetch queue in this form; the value codec turns
/// them into [`EncodedCell`]s on the consumer side.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Cell reported null by the cursor after read.
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Fixed-point numeric preserved exactly until canonicalisation.
    Decimal(BigDecimal),
    Str(String),
    /// Raw binary (RAW/LONG RAW or a fully materialised BLOB).
    Bytes(Vec<u8>),
    Date(Date),
    Time(Time),
    /// Zone-less timestamp.
    DateTime(PrimitiveDateTime),
    /// Timestamp with a zone or offset attached.
    ZonedDateTime(OffsetDateTime),
    /// Vendor collection value, rendered recursively on encode.
    Array(Vec<Value>),
    /// Vendor object value: type name plus ordered attribute values.
    Struct { type_name: String, fields: Vec<Value> },
    /// Dense float vector.
    Vector(Vec<f64>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short kind label used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Str(_) => "string",
            Self::Bytes(_) => "binary",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "timestamp",
            Self::ZonedDateTime(_) => "timestamptz",
            Self::Array(_) => "array",
            Self::Struct { .. } => "struct",
            Self::Vector(_) => "vector",
        }
    }
}

/// A cell after encoding: text in the normal case, or an
/// already-primitive scalar the downstream emits as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedCell {
    /// Null sentinel; formatters render it as an empty field (CSV) or
    /// a literal `null` (SQL script, non-string columns).
    Null,
    Text(String),
    Bool(bool),
    Int(i32),
}

impl EncodedCell {
    /// Textual form of the cell for formatters that only deal in text.
    /// Null renders as the empty string.
    #[must_use]
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Null => std::borrow::Cow::Borrowed(""),
            Self::Text(s) => std::borrow::Cow::Borrowed(s),
            Self::Bool(b) => std::borrow::Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::Int(i) => std::borrow::Cow::Owned(i.to_string()),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A decoded parameter ready to bind into a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    /// Arbitrary-precision integer for columns wider than 64 bits.
    BigInt(BigInt),
    F32(f32),
    F64(f64),
    Decimal(BigDecimal),
    Str(String),
    Bytes(Vec<u8>),
    Date(Date),
    Time(Time),
    TimeTz(Time, UtcOffset),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
}

impl Param {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}
