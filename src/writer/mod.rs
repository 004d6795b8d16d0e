//! Drivers for the cursor-to-file flows.
//!
//! [`RowWriter`] glues a [`RowSource`] to a [`FileSink`] through the
//! value codec and a line formatter: delimited text or an INSERT
//! script, selected by composition.

mod format;

pub use format::{CsvLineFormatter, RowFormatter, SqlInsertFormatter, WriteContext};

use log::debug;

use crate::codec::Encoder;
use crate::codec::encode::encode_row;
use crate::error::Result;
use crate::schema::TypeTag;
use crate::sink::{ControlColumn, FileSink, write_control_file};
use crate::source::{CancelToken, PrefetchOptions, RowSource, run_prefetch};
use crate::value::EncodedCell;

/// Streaming options for one write run.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Emit a header row of column names (delimited output only).
    pub include_header: bool,
    /// Stream through the background prefetcher instead of pulling.
    pub prefetch: Option<PrefetchOptions>,
    /// Row cap for pull mode; `0` means unlimited.
    pub row_limit: u64,
    /// Emit the loader control sidecar next to the output.
    pub control_sidecar: bool,
}

/// Drives rows from a source into a file sink through a formatter.
pub struct RowWriter {
    sink: FileSink,
    formatter: Box<dyn RowFormatter>,
    line: String,
    rows_written: u64,
}

impl RowWriter {
    #[must_use]
    pub fn new(sink: FileSink, formatter: Box<dyn RowFormatter>) -> Self {
        Self {
            sink,
            formatter,
            line: String::new(),
            rows_written: 0,
        }
    }

    /// Rows written so far, header excluded.
    #[must_use]
    pub const fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Formats and stages one encoded row, letting the sink decide
    /// whether a physical flush is due.
    ///
    /// # Errors
    ///
    /// Propagates formatter and sink failures; row-level failures are
    /// fatal here, a partial row must never reach the file.
    pub fn write_row(&mut self, cells: &[EncodedCell]) -> Result<()> {
        self.line.clear();
        self.formatter.format_row(cells, &mut self.line)?;
        self.sink.write_str(&self.line)?;
        self.sink.flush(false)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Streams the whole source into the sink and returns the number of
    /// data rows written. Pull mode by default; prefetch mode when
    /// configured.
    ///
    /// # Errors
    ///
    /// Propagates source, codec, and sink failures; surfaces
    /// [`crate::Error::Aborted`] when the token fires.
    pub fn write_all(
        &mut self,
        mut source: RowSource,
        encoder: &Encoder,
        token: &CancelToken,
        options: &WriteOptions,
    ) -> Result<u64> {
        let columns = source.columns_shared();

        if options.control_sidecar {
            self.emit_control_sidecar(&source, options)?;
        }

        if options.include_header && self.formatter.wants_header() {
            let header: Vec<EncodedCell> = columns
                .iter()
                .map(|c| EncodedCell::Text(c.name.clone()))
                .collect();
            self.write_row(&header)?;
            self.rows_written -= 1;
        }

        let before = self.rows_written;
        match options.prefetch {
            Some(prefetch) => {
                debug!("writing via prefetch, queue capacity {}", prefetch.queue_capacity());
                run_prefetch(source, encoder, token, &prefetch, |cells| {
                    self.write_row(cells)
                })?;
            }
            None => {
                while let Some(row) = source.next_raw()? {
                    if token.is_cancelled() {
                        source.close();
                        return Err(crate::Error::Aborted);
                    }
                    crate::source::ensure_row_width(row.len(), columns.len())?;
                    let cells = encode_row(encoder, &row, &columns)?;
                    self.write_row(&cells)?;
                    if options.row_limit > 0 && self.rows_written - before >= options.row_limit {
                        source.close();
                        break;
                    }
                }
            }
        }
        self.sink.flush(true)?;
        Ok(self.rows_written - before)
    }

    fn emit_control_sidecar(&self, source: &RowSource, options: &WriteOptions) -> Result<()> {
        let entry = self.sink.entry_name().to_owned();
        let base = entry.rsplit_once('.').map_or(entry.as_str(), |(b, _)| b);
        let ctl_path = self
            .sink
            .path()
            .with_file_name(format!("{base}.ctl"));
        let columns: Vec<ControlColumn> = source
            .columns()
            .iter()
            .map(|c| ControlColumn {
                name: c.name.clone(),
                tag: match c.tag {
                    TypeTag::Object => None,
                    tag => Some(tag),
                },
            })
            .collect();
        let ctx = self.formatter.context();
        write_control_file(
            &ctl_path,
            base,
            ctx.separator,
            ctx.quote,
            &ctx.line_terminator,
            u32::from(options.include_header),
            &columns,
        )
    }

    /// Flushes and closes the sink.
    ///
    /// # Errors
    ///
    /// Propagates the final flush/close failure.
    pub fn finish(mut self) -> Result<u64> {
        self.sink.close()?;
        Ok(self.rows_written)
    }
}
