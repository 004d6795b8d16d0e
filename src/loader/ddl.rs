//! Table DDL inference from a sample of parsed rows.
//!
//! A threshold vote: every sampled non-empty value is offered to each
//! candidate parser, and the first candidate (in a fixed priority
//! order) whose vote share reaches 80% wins the column. Anything else
//! falls back to a character column.

use crate::codec::numeric::{Numeric, parse_numeric};
use crate::codec::temporal::{Temporal, TemporalFormats};
use crate::codec::binary;
use crate::loader::options::{ColumnSizePolicy, LoaderOptions};
use crate::schema::Dialect;

/// Vote share a candidate type needs to win a column.
const ELECTION_THRESHOLD: f64 = 0.8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Candidate {
    Boolean,
    Int,
    BigInt,
    Decimal,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Binary,
}

const PRIORITY: [Candidate; 9] = [
    Candidate::Boolean,
    Candidate::Int,
    Candidate::BigInt,
    Candidate::Decimal,
    Candidate::Date,
    Candidate::Time,
    Candidate::Timestamp,
    Candidate::TimestampTz,
    Candidate::Binary,
];

#[derive(Default)]
struct ColumnSample {
    non_empty: u64,
    votes: [u64; 9],
    max_len: usize,
    max_int_digits: usize,
    max_frac_digits: usize,
}

impl ColumnSample {
    fn offer(&mut self, value: &str, formats: &mut TemporalFormats, times: &mut TemporalFormats) {
        let v = value.trim();
        if v.is_empty() {
            return;
        }
        self.non_empty += 1;
        self.max_len = self.max_len.max(v.chars().count());

        if is_boolean(v) {
            self.votes[Candidate::Boolean as usize] += 1;
        }
        if let Ok(numeric) = parse_numeric(v) {
            match &numeric {
                Numeric::I8(_) | Numeric::I16(_) | Numeric::I32(_) => {
                    self.votes[Candidate::Int as usize] += 1;
                    self.votes[Candidate::BigInt as usize] += 1;
                }
                Numeric::I64(_) => self.votes[Candidate::BigInt as usize] += 1,
                _ => {}
            }
            self.votes[Candidate::Decimal as usize] += 1;
            let (int_digits, frac_digits) = digit_shape(v);
            self.max_int_digits = self.max_int_digits.max(int_digits);
            self.max_frac_digits = self.max_frac_digits.max(frac_digits);
        } else {
            match formats.parse(v) {
                Some(Temporal::Date(_)) => self.votes[Candidate::Date as usize] += 1,
                Some(Temporal::DateTime(_)) => self.votes[Candidate::Timestamp as usize] += 1,
                Some(Temporal::Zoned(_)) => self.votes[Candidate::TimestampTz as usize] += 1,
                Some(Temporal::Time(_) | Temporal::TimeTz(_, _)) | None => {
                    if times.parse(v).is_some() {
                        self.votes[Candidate::Time as usize] += 1;
                    } else if binary::parse_binary(v).is_ok() {
                        self.votes[Candidate::Binary as usize] += 1;
                    }
                }
            }
        }
    }

    fn elect(&self) -> Option<Candidate> {
        if self.non_empty == 0 {
            return None;
        }
        let needed = (self.non_empty as f64 * ELECTION_THRESHOLD).ceil() as u64;
        PRIORITY
            .into_iter()
            .find(|c| self.votes[*c as usize] >= needed)
    }
}

/// One inferred column: name plus dialect type declaration.
#[derive(Debug, Clone)]
pub struct InferredColumn {
    pub name: String,
    pub declaration: String,
}

/// Infers column declarations from sampled rows and renders a
/// `CREATE TABLE` statement for the configured dialect.
#[must_use]
pub fn infer_create_table(
    options: &LoaderOptions,
    table: &str,
    header: &[String],
    sample: &[Vec<String>],
) -> String {
    let columns = infer_columns(options, header, sample);
    let dialect = options.platform;
    let mut out = format!("CREATE TABLE {} (", dialect.quote(table));
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("\n    ");
        out.push_str(&dialect.quote(&column.name));
        out.push(' ');
        out.push_str(&column.declaration);
    }
    out.push_str("\n)");
    out
}

/// Per-column inference over the first `scan_rows` non-empty rows.
#[must_use]
pub fn infer_columns(
    options: &LoaderOptions,
    header: &[String],
    sample: &[Vec<String>],
) -> Vec<InferredColumn> {
    let mut formats = TemporalFormats::datetime();
    let mut times = TemporalFormats::time_only();
    let mut samples: Vec<ColumnSample> = (0..header.len()).map(|_| ColumnSample::default()).collect();
    for row in sample.iter().take(options.scan_rows) {
        for (column, value) in samples.iter_mut().zip(row) {
            column.offer(value, &mut formats, &mut times);
        }
    }
    header
        .iter()
        .zip(&samples)
        .map(|(name, sample)| InferredColumn {
            name: name.clone(),
            declaration: declaration(options, sample),
        })
        .collect()
}

fn declaration(options: &LoaderOptions, sample: &ColumnSample) -> String {
    let dialect = options.platform;
    match sample.elect() {
        Some(Candidate::Boolean) => match dialect {
            Dialect::Oracle => "NUMBER(1)".to_owned(),
            Dialect::SqlServer | Dialect::Sybase => "BIT".to_owned(),
            _ => "BOOLEAN".to_owned(),
        },
        Some(Candidate::Int) => match dialect {
            Dialect::Oracle => "NUMBER(10)".to_owned(),
            _ => "INTEGER".to_owned(),
        },
        Some(Candidate::BigInt) => match dialect {
            Dialect::Oracle => "NUMBER(19)".to_owned(),
            _ => "BIGINT".to_owned(),
        },
        Some(Candidate::Decimal) => {
            let scale = sample.max_frac_digits;
            let precision = (sample.max_int_digits + scale).max(1);
            match dialect {
                Dialect::Oracle => format!("NUMBER({precision},{scale})"),
                _ => format!("DECIMAL({precision},{scale})"),
            }
        }
        Some(Candidate::Date) => "DATE".to_owned(),
        Some(Candidate::Time) => match dialect {
            Dialect::Oracle => "DATE".to_owned(),
            _ => "TIME".to_owned(),
        },
        Some(Candidate::Timestamp) => match dialect {
            Dialect::MySql | Dialect::MariaDb => "DATETIME".to_owned(),
            Dialect::SqlServer | Dialect::Sybase => "DATETIME2".to_owned(),
            _ => "TIMESTAMP".to_owned(),
        },
        Some(Candidate::TimestampTz) => match dialect {
            Dialect::MySql | Dialect::MariaDb => "TIMESTAMP".to_owned(),
            Dialect::SqlServer | Dialect::Sybase => "DATETIMEOFFSET".to_owned(),
            _ => "TIMESTAMP WITH TIME ZONE".to_owned(),
        },
        Some(Candidate::Binary) => {
            let len = char_width(options, sample);
            match dialect {
                Dialect::Postgres => "BYTEA".to_owned(),
                Dialect::Oracle => format!("RAW({})", len.min(2000)),
                _ => format!("VARBINARY({len})"),
            }
        }
        None => {
            let len = char_width(options, sample);
            match dialect {
                Dialect::Oracle => format!("VARCHAR2({})", len.min(4000)),
                _ => format!("VARCHAR({len})"),
            }
        }
    }
}

fn char_width(options: &LoaderOptions, sample: &ColumnSample) -> i64 {
    match options.column_size {
        ColumnSizePolicy::Actual => sample.max_len.max(1) as i64,
        ColumnSizePolicy::Maximum => options.platform.max_varchar(),
    }
}

fn is_boolean(v: &str) -> bool {
    matches!(
        v.to_ascii_uppercase().as_str(),
        "TRUE" | "FALSE" | "YES" | "NO" | "Y" | "N" | "1" | "0"
    )
}

/// Longest run of digits before and after the decimal point.
fn digit_shape(v: &str) -> (usize, usize) {
    let mantissa = v.split(['e', 'E']).next().unwrap_or(v);
    let unsigned = mantissa.trim_start_matches(['+', '-']);
    match unsigned.split_once('.') {
        Some((int, frac)) => (int.len(), frac.len()),
        None => (unsigned.len(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| (*s).to_owned()).collect())
            .collect()
    }

    #[test]
    fn elects_int_and_decimal() {
        let options = LoaderOptions::default();
        let header = vec!["ID".to_owned(), "AMOUNT".to_owned()];
        let sample = rows(&[&["1", "10.50"], &["2", "20.00"], &["3", "30"], &["4", "40.5"]]);
        let cols = infer_columns(&options, &header, &sample);
        assert_eq!(cols[0].declaration, "INTEGER");
        assert_eq!(cols[1].declaration, "DECIMAL(4,2)");
    }

    #[test]
    fn elects_temporals() {
        let options = LoaderOptions::default();
        let header = vec!["D".to_owned(), "TS".to_owned()];
        let sample = rows(&[
            &["2024-01-01", "2024-01-01 10:00:00"],
            &["2024-01-02", "2024-01-02 11:30:00"],
            &["2024-01-03", "2024-01-03 12:45:15"],
        ]);
        let cols = infer_columns(&options, &header, &sample);
        assert_eq!(cols[0].declaration, "DATE");
        assert_eq!(cols[1].declaration, "TIMESTAMP");
    }

    #[test]
    fn below_threshold_falls_back_to_varchar() {
        let mut options = LoaderOptions::default();
        options.set("COLUMN_SIZE", "actual").unwrap();
        let header = vec!["MIXED".to_owned()];
        let sample = rows(&[&["1"], &["two"], &["three"], &["4"], &["five"]]);
        let cols = infer_columns(&options, &header, &sample);
        assert_eq!(cols[0].declaration, "VARCHAR(5)");
    }

    #[test]
    fn boolean_wins_over_int_for_flag_columns() {
        let options = LoaderOptions::default();
        let header = vec!["FLAG".to_owned()];
        let sample = rows(&[&["1"], &["0"], &["1"], &["0"]]);
        let cols = infer_columns(&options, &header, &sample);
        assert_eq!(cols[0].declaration, "BOOLEAN");
    }

    #[test]
    fn create_table_statement_quotes_identifiers() {
        let mut options = LoaderOptions::default();
        options.set("PLATFORM", "mysql").unwrap();
        options.set("COLUMN_SIZE", "actual").unwrap();
        let header = vec!["id".to_owned(), "note".to_owned()];
        let sample = rows(&[&["1", "hello"], &["2", "world"]]);
        let ddl = infer_create_table(&options, "t", &header, &sample);
        assert_eq!(
            ddl,
            "CREATE TABLE `t` (\n    `id` INTEGER,\n    `note` VARCHAR(5)\n)"
        );
    }
}
