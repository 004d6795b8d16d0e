use std::collections::{HashMap, HashSet};

use crate::codec::CodecConfig;
use crate::error::{Error, Result};
use crate::schema::Dialect;

/// Placeholder style for the generated INSERT statement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PlaceholderStyle {
    /// `?` positional placeholders.
    #[default]
    Question,
    /// `:1`, `:2`, … numbered placeholders.
    Colon,
}

/// Dry-run switch: emit statements to the logger instead of executing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Show {
    #[default]
    Off,
    Ddl,
    Dml,
    All,
}

impl Show {
    #[must_use]
    pub const fn includes_ddl(self) -> bool {
        matches!(self, Self::Ddl | Self::All)
    }

    #[must_use]
    pub const fn includes_dml(self) -> bool {
        matches!(self, Self::Dml | Self::All)
    }
}

/// Width policy for generated character columns.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ColumnSizePolicy {
    /// Longest observed value.
    Actual,
    /// Dialect maximum.
    #[default]
    Maximum,
}

/// Policy for CSV header columns with no matching table column.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum SkipColumns {
    /// Silently drop unmatched columns.
    #[default]
    Auto,
    /// Any unmatched column is a schema mismatch.
    Off,
    /// Drop exactly the named columns; other mismatches fail.
    Named(HashSet<String>),
}

/// Loader configuration. Option names and string values parse
/// case-insensitively via [`set`](LoaderOptions::set).
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    pub batch_rows: usize,
    pub row_limit: u64,
    /// Per-row error cap; `-1` is unlimited.
    pub errors: i64,
    /// Progress cadence in MiB; `-1` disables progress lines.
    pub report_mb: i64,
    pub delimiter: char,
    pub enclosure: char,
    pub escape: char,
    pub skip_rows: u64,
    pub has_header: bool,
    /// Charset label; `auto` or empty detects from the file head.
    pub encoding: String,
    pub variable_format: PlaceholderStyle,
    pub show: Show,
    pub create: bool,
    pub truncate: bool,
    pub platform: Dialect,
    pub scan_rows: usize,
    pub column_size: ColumnSizePolicy,
    pub date_format: Option<String>,
    pub timestamp_format: Option<String>,
    pub timestamptz_format: Option<String>,
    /// CSV name to table name, keys stored upper-case.
    pub map_column_names: HashMap<String, String>,
    pub unescape_newline: bool,
    pub skip_columns: SkipColumns,
    pub column_info_sql: Option<String>,
    /// Progress sink; `None` is stdout.
    pub logger_path: Option<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_rows: 2048,
            row_limit: 0,
            errors: -1,
            report_mb: 10,
            delimiter: ',',
            enclosure: '"',
            escape: '\\',
            skip_rows: 0,
            has_header: true,
            encoding: "auto".to_owned(),
            variable_format: PlaceholderStyle::Question,
            show: Show::Off,
            create: false,
            truncate: false,
            platform: Dialect::Generic,
            scan_rows: 200,
            column_size: ColumnSizePolicy::Maximum,
            date_format: None,
            timestamp_format: None,
            timestamptz_format: None,
            map_column_names: HashMap::new(),
            unescape_newline: true,
            skip_columns: SkipColumns::Auto,
            column_info_sql: None,
            logger_path: None,
        }
    }
}

impl LoaderOptions {
    /// Applies one `NAME=value` option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown names or unparsable values.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name.trim().to_ascii_uppercase().as_str() {
            "BATCH_ROWS" => self.batch_rows = parse_number(name, value)?,
            "ROW_LIMIT" => self.row_limit = parse_number(name, value)?,
            "ERRORS" => self.errors = parse_number(name, value)?,
            "REPORT_MB" => self.report_mb = parse_number(name, value)?,
            "DELIMITER" => self.delimiter = parse_char(name, value)?,
            "ENCLOSURE" => self.enclosure = parse_char(name, value)?,
            "ESCAPE" => self.escape = parse_char(name, value)?,
            "SKIP_ROWS" => self.skip_rows = parse_number(name, value)?,
            "HAS_HEADER" => self.has_header = parse_bool(name, value)?,
            "ENCODING" => self.encoding = value.to_owned(),
            "VARIABLE_FORMAT" => {
                self.variable_format = match value {
                    "?" => PlaceholderStyle::Question,
                    ":" => PlaceholderStyle::Colon,
                    other => {
                        return Err(Error::config(format!(
                            "VARIABLE_FORMAT must be '?' or ':', got '{other}'"
                        )));
                    }
                };
            }
            "SHOW" => {
                self.show = match value.to_ascii_uppercase().as_str() {
                    "OFF" | "FALSE" | "0" | "NO" | "N" => Show::Off,
                    "DDL" => Show::Ddl,
                    "DML" => Show::Dml,
                    "ALL" | "ON" | "TRUE" | "1" | "YES" | "Y" => Show::All,
                    other => {
                        return Err(Error::config(format!("unknown SHOW mode '{other}'")));
                    }
                };
            }
            "CREATE" => self.create = parse_bool(name, value)?,
            "TRUNCATE" => self.truncate = parse_bool(name, value)?,
            "PLATFORM" => {
                self.platform = Dialect::from_name(value).ok_or_else(|| {
                    Error::config(format!("unknown PLATFORM '{value}'"))
                })?;
            }
            "SCAN_ROWS" => self.scan_rows = parse_number(name, value)?,
            "COLUMN_SIZE" => {
                self.column_size = match value.to_ascii_uppercase().as_str() {
                    "ACTUAL" => ColumnSizePolicy::Actual,
                    "MAXIMUM" => ColumnSizePolicy::Maximum,
                    other => {
                        return Err(Error::config(format!(
                            "COLUMN_SIZE must be ACTUAL or MAXIMUM, got '{other}'"
                        )));
                    }
                };
            }
            "DATE_FORMAT" => self.date_format = auto_is_none(value),
            "TIMESTAMP_FORMAT" => self.timestamp_format = auto_is_none(value),
            "TIMESTAMPTZ_FORMAT" => self.timestamptz_format = auto_is_none(value),
            "MAP_COLUMN_NAMES" => self.map_column_names = parse_name_map(value),
            "UNESCAPE_NEWLINE" => self.unescape_newline = parse_bool(name, value)?,
            "SKIP_COLUMNS" => {
                self.skip_columns = match value.to_ascii_uppercase().as_str() {
                    "AUTO" | "" => SkipColumns::Auto,
                    "OFF" => SkipColumns::Off,
                    _ => SkipColumns::Named(
                        parse_list(value)
                            .into_iter()
                            .map(|s| s.to_ascii_uppercase())
                            .collect(),
                    ),
                };
            }
            "COLUMN_INFO_SQL" => {
                self.column_info_sql = (!value.is_empty()).then(|| value.to_owned());
            }
            "LOGGER" => {
                self.logger_path =
                    (!value.is_empty() && !value.eq_ignore_ascii_case("stdout"))
                        .then(|| value.to_owned());
            }
            other => {
                return Err(Error::config(format!("unknown option '{other}'")));
            }
        }
        Ok(())
    }

    /// Codec configuration derived from these options.
    #[must_use]
    pub fn codec_config(&self) -> CodecConfig {
        let mut config = CodecConfig {
            unescape_newline: self.unescape_newline,
            ..CodecConfig::default()
        };
        config.date_format.clone_from(&self.date_format);
        config.timestamp_format.clone_from(&self.timestamp_format);
        config
            .timestamptz_format
            .clone_from(&self.timestamptz_format);
        config
    }

    /// The placeholder for 1-based position `n`.
    #[must_use]
    pub fn placeholder(&self, n: usize) -> String {
        match self.variable_format {
            PlaceholderStyle::Question => "?".to_owned(),
            PlaceholderStyle::Colon => format!(":{n}"),
        }
    }
}

fn auto_is_none(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(value.to_owned())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("invalid numeric value for {name}: '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_uppercase().as_str() {
        "TRUE" | "1" | "YES" | "Y" | "ON" => Ok(true),
        "FALSE" | "0" | "NO" | "N" | "OFF" => Ok(false),
        other => Err(Error::config(format!(
            "invalid boolean value for {name}: '{other}'"
        ))),
    }
}

fn parse_char(name: &str, value: &str) -> Result<char> {
    match value.to_ascii_lowercase().as_str() {
        "tab" | "\\t" => return Ok('\t'),
        "\\n" => return Ok('\n'),
        _ => {}
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::config(format!(
            "{name} must be a single character, got '{value}'"
        ))),
    }
}

/// Parses `(a,b,c)` or `a,b,c` into items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses `(csv1=db1,csv2=db2)` into an upper-cased lookup.
fn parse_name_map(value: &str) -> HashMap<String, String> {
    parse_list(value)
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_owned()))
        })
        .collect()
}
