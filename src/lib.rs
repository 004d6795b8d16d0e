//! Stream tabular rows between database cursors, delimited text files,
//! and batched parameterised inserts.
//!
//! Three flows share the same primitives:
//!
//! 1. cursor → CSV file (optionally gzip/zip compressed),
//! 2. cursor → `INSERT` script file,
//! 3. CSV file → table, through a batched prepared statement with
//!    per-row error isolation and a `.bad` sidecar.
//!
//! The crate never talks to a concrete database: exports consume any
//! [`db::VendorCursor`], loads run over any [`db::Connection`]. The
//! [`db::memory`] engine backs the tests and the CLI dry-run mode.

pub mod codec;
pub mod db;
pub mod detect;
pub mod error;
pub mod loader;
pub mod logger;
pub mod schema;
pub mod sink;
pub mod source;
pub mod value;
pub mod writer;

pub use error::{Error, Result};
pub use loader::{LoadStats, Loader, options::LoaderOptions};
pub use logger::Logger;
pub use sink::{Compression, FileSink};
pub use source::{CancelToken, PrefetchOptions, RowSource};
pub use value::{EncodedCell, Param, Value};
pub use writer::{CsvLineFormatter, RowWriter, SqlInsertFormatter, WriteContext, WriteOptions};
