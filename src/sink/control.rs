use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::schema::TypeTag;

/// One column entry for the loader control sidecar. A `None` tag means
/// the loader has no type mapping for the column and renders `FILLER`.
#[derive(Debug, Clone)]
pub struct ControlColumn {
    pub name: String,
    pub tag: Option<TypeTag>,
}

/// Renders and writes the Oracle SQL*Loader control sidecar next to the
/// CSV output. `base` is the output name without extension; `row_sep`
/// other than `\n` is declared via the `STR` clause.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the sidecar cannot be written.
pub fn write_control_file(
    path: &Path,
    base: &str,
    separator: char,
    quote: char,
    row_sep: &str,
    skip: u32,
    columns: &[ControlColumn],
) -> Result<()> {
    let content = render(base, separator, quote, row_sep, skip, columns);
    std::fs::write(path, content)?;
    Ok(())
}

fn render(
    base: &str,
    separator: char,
    quote: char,
    row_sep: &str,
    skip: u32,
    columns: &[ControlColumn],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "OPTIONS (SKIP={skip}, ROWS=3000, BINDSIZE=16777216, STREAMSIZE=33554432,"
    );
    out.push_str("         ERRORS=1000, READSIZE=16777216, DIRECT=FALSE)\n");
    out.push_str("LOAD DATA\n");
    if row_sep == "\n" {
        let _ = writeln!(out, "INFILE      {base}.csv");
    } else {
        let _ = writeln!(out, "INFILE      {base}.csv \"STR '{}'\"", visible(row_sep));
    }
    let _ = writeln!(out, "BADFILE     {base}.bad");
    let _ = writeln!(out, "DISCARDFILE {base}.dsc");
    let _ = writeln!(out, "APPEND INTO TABLE {base}");
    let _ = writeln!(
        out,
        "FIELDS CSV TERMINATED BY {} OPTIONALLY ENCLOSED BY {} AND {} TRAILING NULLCOLS",
        render_char(separator),
        render_char(quote),
        render_char(quote),
    );
    out.push_str("(\n");
    let last = columns.len().saturating_sub(1);
    for (i, column) in columns.iter().enumerate() {
        let quoted = format!("\"{}\"", column.name);
        let spec = column_spec(column);
        let _ = write!(out, "    {quoted:<26} {spec}");
        if i != last {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str(")\n");
    out
}

fn column_spec(column: &ControlColumn) -> String {
    let quoted = format!("\"{}\"", column.name);
    match column.tag {
        None => "FILLER".to_owned(),
        Some(TypeTag::Date) => {
            format!("DATE \"YYYY-MM-DD HH24:MI:SS\" NULLIF {quoted}=BLANKS")
        }
        Some(TypeTag::Timestamp) => {
            format!("TIMESTAMP \"YYYY-MM-DD HH24:MI:SSXFF\" NULLIF {quoted}=BLANKS")
        }
        Some(TypeTag::TimestampTz) => format!(
            "TIMESTAMP WITH TIME ZONE \"YYYY-MM-DD HH24:MI:SSXFF TZH:TZM\" NULLIF {quoted}=BLANKS"
        ),
        Some(_) => format!("NULLIF {quoted}=BLANKS"),
    }
}

/// Printable characters render quoted; anything else as `X'hh'`.
fn render_char(c: char) -> String {
    if c.is_ascii_graphic() || c == ' ' {
        format!("'{c}'")
    } else {
        let mut buf = [0u8; 4];
        let encoded = c.encode_utf8(&mut buf);
        let mut out = String::from("X'");
        for b in encoded.bytes() {
            let _ = write!(out, "{b:02x}");
        }
        out.push('\'');
        out
    }
}

fn visible(row_sep: &str) -> String {
    row_sep.replace('\r', "\\r").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_masks_and_filler() {
        let columns = vec![
            ControlColumn {
                name: "ID".into(),
                tag: Some(TypeTag::Int),
            },
            ControlColumn {
                name: "EVT_TS".into(),
                tag: Some(TypeTag::Timestamp),
            },
            ControlColumn {
                name: "NOTE".into(),
                tag: None,
            },
        ];
        let text = render("events", ',', '"', "\n", 1, &columns);
        assert!(text.contains("OPTIONS (SKIP=1, ROWS=3000"));
        assert!(text.contains("INFILE      events.csv\n"));
        assert!(text.contains("BADFILE     events.bad"));
        assert!(text.contains("DISCARDFILE events.dsc"));
        assert!(text.contains("APPEND INTO TABLE events"));
        assert!(text.contains("TERMINATED BY ',' OPTIONALLY ENCLOSED BY '\"' AND '\"'"));
        assert!(
            text.contains("TIMESTAMP \"YYYY-MM-DD HH24:MI:SSXFF\" NULLIF \"EVT_TS\"=BLANKS"),
            "missing timestamp mask in:\n{text}"
        );
        let filler_line = format!("    {:<26} FILLER", "\"NOTE\"");
        assert!(text.contains(&filler_line), "missing filler in:\n{text}");
    }

    #[test]
    fn non_printable_separator_is_hex() {
        assert_eq!(render_char('\t'), "X'09'");
        assert_eq!(render_char('|'), "'|'");
    }

    #[test]
    fn custom_row_separator_declared() {
        let text = render("t", ',', '"', "\r\n", 0, &[]);
        assert!(text.contains("INFILE      t.csv \"STR '\\r\\n'\""));
    }
}
