use std::sync::OnceLock;

use serde::Serialize;

/// Generic vendor type codes shared by the driver adapters.
///
/// The values follow the common cross-vendor numbering so that adapter
/// metadata can be passed through unmodified.
pub mod type_code {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const REAL: i32 = 7;
    pub const FLOAT: i32 = 6;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const BOOLEAN: i32 = 16;
    pub const SQLXML: i32 = 2009;
    pub const ARRAY: i32 = 2003;
    pub const STRUCT: i32 = 2002;
    pub const JSON: i32 = 2016;
    pub const VECTOR: i32 = -105;
    pub const OTHER: i32 = 1111;
}

/// Semantic type tag of a column, derived once from the vendor type code
/// at cursor open. Drives accessor selection and encode rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Object,
    Boolean,
    Int,
    Long,
    Double,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Raw,
    Blob,
    Clob,
    Xml,
    Array,
    Struct,
    Json,
    Vector,
    String,
}

impl TypeTag {
    /// Maps a vendor type code onto the closed tag set. Codes with no
    /// specific mapping land on `Object` and take the generic accessor.
    #[must_use]
    pub const fn from_vendor_code(code: i32) -> Self {
        use type_code as t;
        match code {
            t::BIT | t::BOOLEAN => Self::Boolean,
            t::TINYINT | t::SMALLINT | t::INTEGER => Self::Int,
            t::BIGINT => Self::Long,
            t::REAL | t::FLOAT | t::DOUBLE | t::NUMERIC | t::DECIMAL => Self::Double,
            t::CHAR | t::VARCHAR | t::LONGVARCHAR => Self::String,
            t::DATE => Self::Date,
            t::TIME | t::TIME_WITH_TIMEZONE => Self::Time,
            t::TIMESTAMP => Self::Timestamp,
            t::TIMESTAMP_WITH_TIMEZONE => Self::TimestampTz,
            t::BINARY | t::VARBINARY | t::LONGVARBINARY => Self::Raw,
            t::BLOB => Self::Blob,
            t::CLOB => Self::Clob,
            t::SQLXML => Self::Xml,
            t::ARRAY => Self::Array,
            t::STRUCT => Self::Struct,
            t::JSON => Self::Json,
            t::VECTOR => Self::Vector,
            _ => Self::Object,
        }
    }
}

/// Immutable column metadata discovered when a cursor is opened.
///
/// The vendor class name is fetched lazily from the first non-null cell
/// of the column, since some drivers only report it once data flows.
#[derive(Debug, Serialize)]
pub struct ColumnDescriptor {
    /// 0-based position within the row.
    pub index: usize,
    pub name: String,
    pub tag: TypeTag,
    pub vendor_type: i32,
    /// Nominal size reported by the driver (characters or digits).
    pub size: i64,
    #[serde(skip_serializing)]
    vendor_class: OnceLock<String>,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(index: usize, name: String, vendor_type: i32, size: i64) -> Self {
        Self {
            index,
            name,
            tag: TypeTag::from_vendor_code(vendor_type),
            vendor_type,
            size,
            vendor_class: OnceLock::new(),
        }
    }

    /// Records the vendor class name observed on the first non-null cell.
    /// Later observations are ignored.
    pub fn note_vendor_class(&self, class_name: &str) {
        let _ = self.vendor_class.set(class_name.to_owned());
    }

    #[must_use]
    pub fn vendor_class(&self) -> Option<&str> {
        self.vendor_class.get().map(String::as_str)
    }
}

impl Clone for ColumnDescriptor {
    fn clone(&self) -> Self {
        let vendor_class = OnceLock::new();
        if let Some(v) = self.vendor_class.get() {
            let _ = vendor_class.set(v.clone());
        }
        Self {
            index: self.index,
            name: self.name.clone(),
            tag: self.tag,
            vendor_type: self.vendor_type,
            size: self.size,
            vendor_class,
        }
    }
}

/// Column description as fetched from the target table for a load,
/// either via connection metadata or the configured override query.
#[derive(Debug, Clone, Serialize)]
pub struct DbColumn {
    pub name: String,
    pub data_type: i32,
    pub type_name: String,
    pub size: i64,
}

/// Target SQL type family for parameter binding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SqlType {
    Char,
    Varchar,
    Clob,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// NUMERIC/DECIMAL; arbitrary precision unless the driver says
    /// otherwise.
    Decimal,
    Real,
    Double,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Boolean,
    Binary,
    Other,
}

impl SqlType {
    #[must_use]
    pub const fn from_vendor_code(code: i32) -> Self {
        use type_code as t;
        match code {
            t::CHAR => Self::Char,
            t::VARCHAR | t::LONGVARCHAR => Self::Varchar,
            t::CLOB => Self::Clob,
            t::TINYINT => Self::TinyInt,
            t::SMALLINT => Self::SmallInt,
            t::INTEGER => Self::Integer,
            t::BIGINT => Self::BigInt,
            t::NUMERIC | t::DECIMAL => Self::Decimal,
            t::REAL => Self::Real,
            t::FLOAT | t::DOUBLE => Self::Double,
            t::DATE => Self::Date,
            t::TIME => Self::Time,
            t::TIME_WITH_TIMEZONE => Self::TimeTz,
            t::TIMESTAMP => Self::Timestamp,
            t::TIMESTAMP_WITH_TIMEZONE => Self::TimestampTz,
            t::BIT | t::BOOLEAN => Self::Boolean,
            t::BINARY | t::VARBINARY | t::LONGVARBINARY | t::BLOB => Self::Binary,
            _ => Self::Other,
        }
    }

    /// Whether an empty script cell for this type should render as a
    /// literal `null` rather than an empty string.
    #[must_use]
    pub const fn is_unquoted(&self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::Integer
                | Self::BigInt
                | Self::Decimal
                | Self::Real
                | Self::Double
                | Self::Boolean
        )
    }
}

/// SQL dialect of the load target; controls identifier quoting, the
/// placeholder style default, and DDL type names.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Dialect {
    Oracle,
    MySql,
    MariaDb,
    Db2,
    SqlServer,
    Sybase,
    Postgres,
    #[default]
    Generic,
}

impl Dialect {
    /// Parses the `PLATFORM` option value, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "oracle" => Some(Self::Oracle),
            "mysql" => Some(Self::MySql),
            "mariadb" => Some(Self::MariaDb),
            "db2" => Some(Self::Db2),
            "mssql" | "sqlserver" => Some(Self::SqlServer),
            "sybase" => Some(Self::Sybase),
            "pgsql" | "postgresql" => Some(Self::Postgres),
            "auto" | "" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Quotes an identifier for this dialect, escaping embedded quote
    /// characters by doubling.
    #[must_use]
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::MySql | Self::MariaDb => format!("`{}`", ident.replace('`', "``")),
            Self::SqlServer | Self::Sybase => format!("[{}]", ident.replace(']', "]]")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Largest VARCHAR width commonly accepted by the dialect, used when
    /// `COLUMN_SIZE=MAXIMUM`.
    #[must_use]
    pub const fn max_varchar(&self) -> i64 {
        match self {
            Self::Oracle => 4000,
            Self::SqlServer | Self::Sybase => 8000,
            Self::MySql | Self::MariaDb => 16383,
            Self::Db2 => 32672,
            Self::Postgres | Self::Generic => 65535,
        }
    }
}
