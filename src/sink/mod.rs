//! Buffered file output with transparent compression.

mod control;
mod file;

pub use control::{ControlColumn, write_control_file};
pub use file::{Compression, FileSink};
