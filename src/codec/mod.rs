//! Bidirectional conversion between typed values and text.
//!
//! [`Encoder`] turns raw cursor values into encoded cells for the file
//! writers; [`Decoder`] turns CSV fields into typed parameters for the
//! loader. Both are driven by a [`CodecConfig`] fixed at construction —
//! configuration is never re-read during a running flow.

pub mod binary;
pub mod decode;
pub mod encode;
pub mod numeric;
pub mod temporal;

pub use decode::Decoder;
pub use encode::Encoder;

/// Default date pattern.
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd";
/// Default timestamp pattern; a trailing all-zero fraction is stripped
/// after formatting.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.SSS";
/// Default timestamp-with-zone pattern: the timestamp pattern plus an
/// offset specifier.
pub const DEFAULT_TIMESTAMPTZ_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.SSSX";
/// Fixed time-of-day pattern used by the encoder.
pub const DEFAULT_TIME_FORMAT: &str = "HH:mm:ss";

/// Codec configuration shared by encode and decode.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Trim the textual result of every encoded cell.
    pub trim: bool,
    /// Convert literal `\n` / `\r` escape sequences in character cells
    /// into control characters on decode.
    pub unescape_newline: bool,
    /// Pinned date pattern; `None` detects from the library.
    pub date_format: Option<String>,
    /// Pinned timestamp pattern; `None` detects from the library.
    pub timestamp_format: Option<String>,
    /// Pinned timestamp-with-zone pattern; `None` detects.
    pub timestamptz_format: Option<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            trim: false,
            unescape_newline: true,
            date_format: None,
            timestamp_format: None,
            timestamptz_format: None,
        }
    }
}

impl CodecConfig {
    #[must_use]
    pub const fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    #[must_use]
    pub fn with_date_format(mut self, pattern: impl Into<String>) -> Self {
        self.date_format = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, pattern: impl Into<String>) -> Self {
        self.timestamp_format = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_timestamptz_format(mut self, pattern: impl Into<String>) -> Self {
        self.timestamptz_format = Some(pattern.into());
        self
    }
}
