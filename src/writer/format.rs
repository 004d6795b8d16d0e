use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use itoa::Buffer as ItoaBuffer;

use crate::error::Result;
use crate::schema::{ColumnDescriptor, TypeTag};
use crate::value::EncodedCell;

/// State shared by the line formatters: CSV character policy, column
/// filter, remap map, and the script line-width limit.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    pub line_terminator: String,
    /// Quote every field instead of only those that need it.
    pub apply_quotes_to_all: bool,
    /// Column indexes dropped from the output.
    pub excluded: HashSet<usize>,
    /// Column index to replacement text; wins over the cell value and
    /// also renames the header slot.
    pub remap: HashMap<usize, String>,
    /// Running line width at which the script writer breaks the line.
    pub max_line_width: usize,
}

impl Default for WriteContext {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: '"',
            line_terminator: "\n".to_owned(),
            apply_quotes_to_all: false,
            excluded: HashSet::new(),
            remap: HashMap::new(),
            max_line_width: 120,
        }
    }
}

impl WriteContext {
    fn cell_text<'a>(&'a self, index: usize, cell: &'a EncodedCell) -> Cow<'a, str> {
        self.remap
            .get(&index)
            .map_or_else(|| cell.as_text(), |r| Cow::Borrowed(r.as_str()))
    }
}

/// Formats one encoded row into an output line.
pub trait RowFormatter: Send {
    /// Appends the formatted row (including the line terminator) to
    /// `out`.
    ///
    /// # Errors
    ///
    /// Formatters that cannot render a cell report the failure.
    fn format_row(&mut self, cells: &[EncodedCell], out: &mut String) -> Result<()>;

    /// Whether the driver should emit a header row of column names.
    fn wants_header(&self) -> bool {
        true
    }

    /// The shared write context, for drivers that need the dialect.
    fn context(&self) -> &WriteContext;
}

/// Delimited-text formatter: separator insertion, conditional quoting,
/// quote/escape doubling.
pub struct CsvLineFormatter {
    ctx: WriteContext,
}

impl CsvLineFormatter {
    #[must_use]
    pub const fn new(ctx: WriteContext) -> Self {
        Self { ctx }
    }

    fn needs_quotes(&self, text: &str) -> bool {
        self.ctx.apply_quotes_to_all
            || text.chars().any(|c| {
                c == self.ctx.separator
                    || c == self.ctx.quote
                    || c == self.ctx.escape
                    || c == '\r'
                    || c == '\n'
            })
    }

    fn push_field(&self, text: &str, out: &mut String) {
        if !self.needs_quotes(text) {
            out.push_str(text);
            return;
        }
        out.push(self.ctx.quote);
        for c in text.chars() {
            if c == self.ctx.quote || c == self.ctx.escape {
                out.push(self.ctx.escape);
            }
            out.push(c);
        }
        out.push(self.ctx.quote);
    }
}

impl RowFormatter for CsvLineFormatter {
    fn format_row(&mut self, cells: &[EncodedCell], out: &mut String) -> Result<()> {
        let mut first = true;
        for (index, cell) in cells.iter().enumerate() {
            if self.ctx.excluded.contains(&index) {
                continue;
            }
            if !first {
                out.push(self.ctx.separator);
            }
            first = false;
            let text = self.ctx.cell_text(index, cell);
            self.push_field(&text, out);
        }
        out.push_str(&self.ctx.line_terminator);
        Ok(())
    }

    fn context(&self) -> &WriteContext {
        &self.ctx
    }
}

/// INSERT-script formatter: one `INSERT INTO … VALUES (…);` statement
/// per row, with type-aware quoting and continuation breaks past the
/// line-width limit.
pub struct SqlInsertFormatter {
    ctx: WriteContext,
    prefix: String,
    /// Per original column index: render unquoted (numeric/boolean).
    unquoted: Vec<bool>,
}

impl SqlInsertFormatter {
    #[must_use]
    pub fn new(ctx: WriteContext, table: &str, columns: &[ColumnDescriptor]) -> Self {
        let names: Vec<&str> = columns
            .iter()
            .filter(|c| !ctx.excluded.contains(&c.index))
            .map(|c| c.name.as_str())
            .collect();
        let prefix = format!("INSERT INTO {table}({}) VALUES (", names.join(","));
        let unquoted = columns
            .iter()
            .map(|c| {
                matches!(
                    c.tag,
                    TypeTag::Boolean | TypeTag::Int | TypeTag::Long | TypeTag::Double
                )
            })
            .collect();
        Self {
            ctx,
            prefix,
            unquoted,
        }
    }

    fn push_value(&self, index: usize, cell: &EncodedCell, out: &mut String) {
        if let Some(replacement) = self.ctx.remap.get(&index) {
            push_quoted(replacement, out);
            return;
        }
        match cell {
            EncodedCell::Null => out.push_str("null"),
            EncodedCell::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            EncodedCell::Int(v) => out.push_str(ItoaBuffer::new().format(*v)),
            EncodedCell::Text(t) => {
                if self.unquoted.get(index).copied().unwrap_or(false) {
                    if t.is_empty() {
                        out.push_str("null");
                    } else {
                        out.push_str(t);
                    }
                } else {
                    push_quoted(t, out);
                }
            }
        }
    }
}

/// SQL single-quote policy: embedded quotes double.
fn push_quoted(text: &str, out: &mut String) {
    out.push('\'');
    if text.contains('\'') {
        out.push_str(&text.replace('\'', "''"));
    } else {
        out.push_str(text);
    }
    out.push('\'');
}

impl RowFormatter for SqlInsertFormatter {
    fn format_row(&mut self, cells: &[EncodedCell], out: &mut String) -> Result<()> {
        let start = out.len();
        out.push_str(&self.prefix);
        let mut line_start = start;
        let mut first = true;
        for (index, cell) in cells.iter().enumerate() {
            if self.ctx.excluded.contains(&index) {
                continue;
            }
            if !first {
                out.push(',');
            }
            first = false;
            if out.len() - line_start > self.ctx.max_line_width {
                out.push_str(&self.ctx.line_terminator);
                line_start = out.len();
                out.push_str("  ");
            }
            self.push_value(index, cell, out);
        }
        out.push_str(");");
        out.push_str(&self.ctx.line_terminator);
        Ok(())
    }

    fn wants_header(&self) -> bool {
        false
    }

    fn context(&self) -> &WriteContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::type_code;

    fn text(s: &str) -> EncodedCell {
        EncodedCell::Text(s.into())
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let mut f = CsvLineFormatter::new(WriteContext::default());
        let mut out = String::new();
        f.format_row(
            &[text("1"), text("a,b"), EncodedCell::Null],
            &mut out,
        )
        .unwrap();
        assert_eq!(out, "1,\"a,b\",\n");
    }

    #[test]
    fn csv_doubles_embedded_quotes() {
        let mut f = CsvLineFormatter::new(WriteContext::default());
        let mut out = String::new();
        f.format_row(&[text("say \"hi\"")], &mut out).unwrap();
        assert_eq!(out, "\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn csv_distinct_escape_char() {
        let ctx = WriteContext {
            escape: '\\',
            ..WriteContext::default()
        };
        let mut f = CsvLineFormatter::new(ctx);
        let mut out = String::new();
        f.format_row(&[text("a\"b\\c")], &mut out).unwrap();
        assert_eq!(out, "\"a\\\"b\\\\c\"\n");
    }

    #[test]
    fn csv_exclude_and_remap() {
        let ctx = WriteContext {
            excluded: HashSet::from([1]),
            remap: HashMap::from([(2, "fixed".to_owned())]),
            ..WriteContext::default()
        };
        let mut f = CsvLineFormatter::new(ctx);
        let mut out = String::new();
        f.format_row(&[text("a"), text("dropped"), text("ignored")], &mut out)
            .unwrap();
        assert_eq!(out, "a,fixed\n");
    }

    #[test]
    fn quote_all_policy() {
        let ctx = WriteContext {
            apply_quotes_to_all: true,
            ..WriteContext::default()
        };
        let mut f = CsvLineFormatter::new(ctx);
        let mut out = String::new();
        f.format_row(&[text("x"), text("y")], &mut out).unwrap();
        assert_eq!(out, "\"x\",\"y\"\n");
    }

    fn script_columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new(0, "ID".into(), type_code::INTEGER, 0),
            ColumnDescriptor::new(1, "NAME".into(), type_code::VARCHAR, 0),
            ColumnDescriptor::new(2, "AMOUNT".into(), type_code::DECIMAL, 0),
        ]
    }

    #[test]
    fn insert_statement_shape() {
        let mut f = SqlInsertFormatter::new(WriteContext::default(), "items", &script_columns());
        assert!(!f.wants_header());
        let mut out = String::new();
        f.format_row(
            &[EncodedCell::Int(1), text("it's"), text("10.5")],
            &mut out,
        )
        .unwrap();
        assert_eq!(
            out,
            "INSERT INTO items(ID,NAME,AMOUNT) VALUES (1,'it''s',10.5);\n"
        );
    }

    #[test]
    fn insert_empty_numeric_becomes_null() {
        let mut f = SqlInsertFormatter::new(WriteContext::default(), "items", &script_columns());
        let mut out = String::new();
        f.format_row(&[text(""), text(""), EncodedCell::Null], &mut out)
            .unwrap();
        assert_eq!(out, "INSERT INTO items(ID,NAME,AMOUNT) VALUES (null,'',null);\n");
    }

    #[test]
    fn insert_wraps_long_lines() {
        let ctx = WriteContext {
            max_line_width: 40,
            ..WriteContext::default()
        };
        let mut f = SqlInsertFormatter::new(ctx, "t", &script_columns());
        let mut out = String::new();
        f.format_row(
            &[
                EncodedCell::Int(1),
                text(&"x".repeat(60)),
                text("2.5"),
            ],
            &mut out,
        )
        .unwrap();
        assert!(out.contains("\n  "), "no continuation break in: {out}");
        assert!(out.ends_with(");\n"));
    }
}
