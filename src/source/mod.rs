//! Streaming row source over a vendor cursor.
//!
//! Presents the cursor as a finite pull sequence of raw typed rows,
//! choosing a vendor accessor per column tag with fixed fallback
//! chains. Prefetch mode (one background producer over a bounded
//! queue) lives in [`prefetch`].

mod prefetch;

pub use prefetch::{CancelToken, PrefetchOptions, run_prefetch};

use std::sync::Arc;

use log::debug;

use crate::codec::binary;
use crate::db::{Accessor, Fetched, VendorCursor};
use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, TypeTag};
use crate::value::Value;

/// Accessor fallback chain for a column tag.
const fn accessor_chain(tag: TypeTag) -> &'static [Accessor] {
    match tag {
        TypeTag::TimestampTz => &[
            Accessor::ZonedTimestamp,
            Accessor::OffsetTimestamp,
            Accessor::Timestamp,
            Accessor::Object,
        ],
        TypeTag::Timestamp => &[Accessor::Timestamp, Accessor::Object],
        TypeTag::Date => &[Accessor::Date, Accessor::Timestamp, Accessor::Object],
        TypeTag::Time => &[Accessor::Time, Accessor::Object],
        TypeTag::Blob => &[Accessor::Blob, Accessor::Object],
        TypeTag::Clob => &[Accessor::Clob, Accessor::Object],
        TypeTag::Xml => &[Accessor::Xml, Accessor::String, Accessor::Object],
        TypeTag::Raw => &[Accessor::String, Accessor::Object],
        TypeTag::Vector => &[Accessor::Vector, Accessor::Object],
        _ => &[Accessor::Object],
    }
}

/// A vendor cursor wrapped as a finite sequence of raw rows.
pub struct RowSource {
    cursor: Box<dyn VendorCursor>,
    columns: Arc<Vec<ColumnDescriptor>>,
    exhausted: bool,
    closed: bool,
}

impl RowSource {
    /// Opens the source: reads metadata once, builds the column
    /// descriptors, sets the preferred fetch size, and best-effort
    /// requests forward-only iteration (a refusal is swallowed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if metadata discovery fails.
    pub fn open(mut cursor: Box<dyn VendorCursor>, fetch_hint: usize) -> Result<Self> {
        let metas = cursor.columns()?;
        cursor.set_fetch_size(fetch_hint);
        if cursor.set_forward_only().is_err() {
            debug!("cursor refused forward-only mode");
        }
        let columns: Vec<ColumnDescriptor> = metas
            .into_iter()
            .enumerate()
            .map(|(i, m)| ColumnDescriptor::new(i, m.name, m.vendor_type, m.size))
            .collect();
        debug!("row source opened with {} columns", columns.len());
        Ok(Self {
            cursor,
            columns: Arc::new(columns),
            exhausted: false,
            closed: false,
        })
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Shared handle to the descriptors for cross-thread consumers.
    #[must_use]
    pub fn columns_shared(&self) -> Arc<Vec<ColumnDescriptor>> {
        Arc::clone(&self.columns)
    }

    /// Advances the cursor and materialises one raw row. Returns `None`
    /// at end of stream (the cursor is closed then); repeated calls
    /// after that keep returning `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] on any cursor failure.
    pub fn next_raw(&mut self) -> Result<Option<Vec<Value>>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.cursor.advance() {
            Ok(true) => self.materialize().map(Some),
            Ok(false) => {
                self.exhausted = true;
                self.close();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn materialize(&mut self) -> Result<Vec<Value>> {
        let columns = Arc::clone(&self.columns);
        let mut row = Vec::with_capacity(columns.len());
        for column in columns.iter() {
            let mut value = Value::Null;
            for accessor in accessor_chain(column.tag) {
                match self.cursor.read(column.index, *accessor)? {
                    Fetched::Value(v) => {
                        value = v;
                        break;
                    }
                    Fetched::Unsupported => {}
                }
            }
            // Whatever the accessor produced, a null report wins.
            if self.cursor.was_null() {
                value = Value::Null;
            }
            if !value.is_null() {
                if column.vendor_class().is_none()
                    && let Some(class) = self.cursor.column_class(column.index)
                {
                    column.note_vendor_class(&class);
                }
                if column.tag == TypeTag::Blob
                    && let Value::Bytes(bytes) = &value
                {
                    // LOB handle freed by the driver; keep the hex form.
                    value = Value::Str(binary::to_hex(bytes));
                }
            }
            row.push(value);
        }
        Ok(row)
    }

    /// Closes the underlying cursor. Safe to call multiple times.
    pub fn close(&mut self) {
        if !self.closed {
            self.cursor.close();
            self.closed = true;
        }
    }
}

impl Drop for RowSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convenience check used by the writers: every produced row must span
/// all columns.
pub(crate) fn ensure_row_width(row_len: usize, expected: usize) -> Result<()> {
    if row_len == expected {
        Ok(())
    } else {
        Err(Error::source(format!(
            "row width {row_len} does not match column count {expected}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnMeta;
    use crate::db::memory::MemoryCursor;
    use crate::schema::type_code;

    fn meta(name: &str, code: i32) -> ColumnMeta {
        ColumnMeta {
            name: name.into(),
            vendor_type: code,
            size: 0,
        }
    }

    #[test]
    fn rows_materialise_in_order_and_eof_is_idempotent() {
        let cursor = MemoryCursor::new(
            vec![meta("ID", type_code::INTEGER), meta("NAME", type_code::VARCHAR)],
            vec![
                vec![Value::Int(1), Value::Str("a".into())],
                vec![Value::Int(2), Value::Null],
            ],
        );
        let mut source = RowSource::open(Box::new(cursor), 100).unwrap();
        assert_eq!(source.columns().len(), 2);
        let first = source.next_raw().unwrap().unwrap();
        assert_eq!(first, vec![Value::Int(1), Value::Str("a".into())]);
        let second = source.next_raw().unwrap().unwrap();
        assert_eq!(second[1], Value::Null);
        assert!(source.next_raw().unwrap().is_none());
        assert!(source.next_raw().unwrap().is_none());
    }

    #[test]
    fn blob_columns_are_hex_encoded_at_materialisation() {
        let cursor = MemoryCursor::new(
            vec![meta("PAYLOAD", type_code::BLOB)],
            vec![vec![Value::Bytes(vec![0xAB, 0xCD])]],
        );
        let mut source = RowSource::open(Box::new(cursor), 10).unwrap();
        let row = source.next_raw().unwrap().unwrap();
        assert_eq!(row[0], Value::Str("ABCD".into()));
    }

    #[test]
    fn accessor_fallback_reaches_generic() {
        // RAW tag: the string accessor is unsupported for byte cells,
        // so the generic accessor must serve them.
        let cursor = MemoryCursor::new(
            vec![meta("R", type_code::BINARY)],
            vec![vec![Value::Bytes(vec![1, 2])]],
        );
        let mut source = RowSource::open(Box::new(cursor), 10).unwrap();
        let row = source.next_raw().unwrap().unwrap();
        assert_eq!(row[0], Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn cursor_error_surfaces() {
        let cursor = MemoryCursor::new(
            vec![meta("ID", type_code::INTEGER)],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        )
        .with_error_after(1);
        let mut source = RowSource::open(Box::new(cursor), 10).unwrap();
        assert!(source.next_raw().unwrap().is_some());
        assert!(source.next_raw().is_err());
    }
}
