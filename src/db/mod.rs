//! Driver-facing traits.
//!
//! The pipeline core never talks to a concrete database. Row export
//! consumes a [`VendorCursor`]; loading binds through a [`Connection`]
//! and its [`PreparedStatement`]s. Adapters for real drivers implement
//! these traits; [`memory`] ships a small in-process engine used by the
//! tests and the CLI dry-run mode.

pub mod memory;

use crate::error::Result;
use crate::value::{Param, Value};

/// Accessor families a row source may request from a vendor cursor.
///
/// The row source picks an accessor per column tag and falls back along
/// a fixed chain when the driver reports [`Fetched::Unsupported`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Accessor {
    /// Timestamp carrying a named zone.
    ZonedTimestamp,
    /// Timestamp carrying a UTC offset.
    OffsetTimestamp,
    /// Zone-less timestamp.
    Timestamp,
    Date,
    Time,
    /// Fully materialised binary large object; the driver frees the
    /// handle before returning.
    Blob,
    /// Fully materialised character large object.
    Clob,
    /// XML rendered to its string value.
    Xml,
    /// Dense float vector.
    Vector,
    String,
    /// Generic typed-object accessor; every driver must service it.
    Object,
}

/// Outcome of a single accessor read.
#[derive(Debug)]
pub enum Fetched {
    Value(Value),
    /// The driver cannot service this accessor for the column; the row
    /// source moves on to the next accessor in its chain.
    Unsupported,
}

/// Column description as reported by a cursor at open time.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub vendor_type: i32,
    pub size: i64,
}

/// A forward-only typed cursor exposed by a database driver.
pub trait VendorCursor: Send {
    /// Reads result metadata. Called exactly once, before any advance.
    fn columns(&mut self) -> Result<Vec<ColumnMeta>>;

    /// Hints the preferred fetch batch size. Best-effort.
    fn set_fetch_size(&mut self, rows: usize);

    /// Requests forward-only iteration. Callers swallow a failure here.
    fn set_forward_only(&mut self) -> Result<()> {
        Ok(())
    }

    /// Advances to the next row. `false` means the cursor is exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Reads the cell at `index` (0-based) through the given accessor.
    fn read(&mut self, index: usize, accessor: Accessor) -> Result<Fetched>;

    /// Whether the most recently read cell was SQL NULL.
    fn was_null(&self) -> bool;

    /// Vendor class name for a column, when the driver reports one.
    fn column_class(&self, index: usize) -> Option<String> {
        let _ = index;
        None
    }

    /// Releases the cursor. Must be safe to call more than once.
    fn close(&mut self);
}

/// Outcome of `execute_batch`, mirroring driver update-count arrays.
pub type UpdateCounts = Vec<i64>;

/// A parameterised statement accumulating batched parameter sets.
pub trait PreparedStatement: Send {
    /// Binds one parameter. `position` is 1-based as in SQL placeholder
    /// numbering.
    fn bind(&mut self, position: usize, param: Param) -> Result<()>;

    /// Moves the currently bound parameters into the pending batch.
    fn add_batch(&mut self) -> Result<()>;

    /// Number of parameter sets pending execution.
    fn batch_len(&self) -> usize;

    /// Executes the pending batch. On success returns one update count
    /// per row; on partial failure returns [`crate::Error::Batch`] whose
    /// `update_counts` use [`crate::error::FAILED_ROW`] for rejected
    /// positions (or report a successful prefix). The pending batch is
    /// cleared either way.
    fn execute_batch(&mut self) -> Result<UpdateCounts>;
}

/// A database connection: statement preparation, transaction control,
/// and column metadata lookup.
pub trait Connection {
    /// Prepares a parameterised statement. The statement owns its driver
    /// resources and outlives this borrow.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Executes a standalone statement (DDL, TRUNCATE); returns the
    /// affected row count when the driver reports one.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn auto_commit(&self) -> bool;

    fn set_auto_commit(&mut self, on: bool) -> Result<()>;

    /// Column metadata for a table, in ordinal order.
    fn table_columns(&mut self, table: &str) -> Result<Vec<crate::schema::DbColumn>>;

    /// Column metadata via a caller-supplied query projecting
    /// `COLUMN_NAME, DATA_TYPE, TYPE_NAME, COLUMN_SIZE`.
    fn query_columns(&mut self, sql: &str) -> Result<Vec<crate::schema::DbColumn>>;
}
