//! Temporal pattern library and per-load runtime cache.
//!
//! Patterns are keyed by a stable, human-readable string in the familiar
//! `yyyy-MM-dd HH:mm:ss.SSS` vocabulary. Each key translates into a
//! `time` format description and compiles lazily on first use. The
//! static library is the cross-product of date shapes, separators, time
//! shapes, fractional-second widths, and zone specifiers; during a load
//! the patterns that actually matched accumulate into a runtime cache
//! that replaces the live list once warmed up, so homogeneous data
//! parses at amortised O(1).

use std::sync::{Arc, OnceLock};

use time::format_description::{self, OwnedFormatItem};
use time::parsing::Parsed;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Error, Result};

/// Rows decoded before cache compaction may trigger.
const COMPACT_MIN_ROWS: u64 = 30;
/// Successful matches recorded before cache compaction may trigger.
const COMPACT_MIN_HITS: u64 = 100;

/// A parsed temporal value before promotion to its target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(Date),
    DateTime(PrimitiveDateTime),
    Zoned(OffsetDateTime),
    Time(Time),
    TimeTz(Time, UtcOffset),
}

/// Byte class used for the cheap shape prefilter. All library patterns
/// render at a fixed width, so a class-per-byte comparison rejects
/// non-candidates without touching the compiled formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Digit,
    Letter,
    Sign,
    Literal(u8),
}

struct Translated {
    desc: String,
    classes: Vec<Class>,
    has_date: bool,
    has_time: bool,
    has_zone: bool,
    two_digit_year: bool,
    fixed_shape: bool,
}

/// A single compiled temporal pattern.
pub struct Pattern {
    key: String,
    desc: String,
    classes: Vec<Class>,
    has_date: bool,
    has_time: bool,
    has_zone: bool,
    two_digit_year: bool,
    fixed_shape: bool,
    compiled: OnceLock<Option<OwnedFormatItem>>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("key", &self.key).finish()
    }
}

impl Pattern {
    /// Compiles a pattern key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown pattern tokens.
    pub fn new(key: &str) -> Result<Self> {
        let t = translate(key)?;
        Ok(Self {
            key: key.to_owned(),
            desc: t.desc,
            classes: t.classes,
            has_date: t.has_date,
            has_time: t.has_time,
            has_zone: t.has_zone,
            two_digit_year: t.two_digit_year,
            fixed_shape: t.fixed_shape,
            compiled: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn has_zone(&self) -> bool {
        self.has_zone
    }

    #[must_use]
    pub const fn has_time(&self) -> bool {
        self.has_time
    }

    fn items(&self) -> Option<&OwnedFormatItem> {
        self.compiled
            .get_or_init(|| format_description::parse_owned::<2>(&self.desc).ok())
            .as_ref()
    }

    /// Fast shape check: length and per-byte class must line up.
    #[must_use]
    pub fn matches_shape(&self, text: &str) -> bool {
        if !self.fixed_shape {
            return true;
        }
        let bytes = text.as_bytes();
        if bytes.len() != self.classes.len() {
            return false;
        }
        self.classes.iter().zip(bytes).all(|(class, b)| match class {
            Class::Digit => b.is_ascii_digit(),
            Class::Letter => b.is_ascii_alphabetic(),
            Class::Sign => *b == b'+' || *b == b'-',
            Class::Literal(c) => b == c,
        })
    }

    /// Attempts to parse `text` with this pattern, resolving leniently
    /// (day-of-month overflow rolls into the following month).
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<Temporal> {
        let items = self.items()?;
        let mut parsed = Parsed::default();
        let remaining = parsed.parse_item(text.as_bytes(), items).ok()?;
        if !remaining.is_empty() {
            return None;
        }
        self.resolve(&parsed)
    }

    fn resolve(&self, parsed: &Parsed) -> Option<Temporal> {
        let time = if self.has_time {
            Some(resolve_time(parsed)?)
        } else {
            None
        };
        let offset = if self.has_zone {
            Some(resolve_offset(parsed)?)
        } else {
            None
        };
        if self.has_date {
            let date = resolve_date(parsed, self.two_digit_year)?;
            let time = time.unwrap_or(Time::MIDNIGHT);
            let dt = PrimitiveDateTime::new(date, time);
            return Some(match offset {
                Some(off) => Temporal::Zoned(dt.assume_offset(off)),
                None if self.has_time => Temporal::DateTime(dt),
                None => Temporal::Date(date),
            });
        }
        let time = time?;
        Some(match offset {
            Some(off) => Temporal::TimeTz(time, off),
            None => Temporal::Time(time),
        })
    }

    fn format_error(&self) -> Error {
        Error::config(format!("pattern '{}' cannot be compiled", self.key))
    }

    /// Formats a date with this pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern cannot render the value.
    pub fn format_date(&self, date: Date) -> Result<String> {
        let items = self.items().ok_or_else(|| self.format_error())?;
        date.format(items)
            .map_err(|e| Error::config(format!("cannot format date: {e}")))
    }

    pub fn format_datetime(&self, dt: PrimitiveDateTime) -> Result<String> {
        let items = self.items().ok_or_else(|| self.format_error())?;
        dt.format(items)
            .map_err(|e| Error::config(format!("cannot format timestamp: {e}")))
    }

    pub fn format_zoned(&self, odt: OffsetDateTime) -> Result<String> {
        let items = self.items().ok_or_else(|| self.format_error())?;
        odt.format(items)
            .map_err(|e| Error::config(format!("cannot format timestamptz: {e}")))
    }

    pub fn format_time(&self, t: Time) -> Result<String> {
        let items = self.items().ok_or_else(|| self.format_error())?;
        t.format(items)
            .map_err(|e| Error::config(format!("cannot format time: {e}")))
    }
}

fn resolve_date(parsed: &Parsed, two_digit_year: bool) -> Option<Date> {
    let year = if two_digit_year {
        sliding_window_year(i32::from(parsed.year_last_two()?))
    } else {
        parsed.year()?
    };
    let month = parsed.month()?;
    let day = parsed.day()?.get();
    let in_month = month.length(year);
    if day <= in_month {
        Date::from_calendar_date(year, month, day).ok()
    } else {
        // Lenient resolution: excess days roll into the next month.
        let base = Date::from_calendar_date(year, month, in_month).ok()?;
        base.checked_add(Duration::days(i64::from(day - in_month)))
    }
}

fn resolve_time(parsed: &Parsed) -> Option<Time> {
    let hour = parsed.hour_24().or_else(|| {
        let h12 = parsed.hour_12()?.get() % 12;
        Some(if parsed.hour_12_is_pm()? { h12 + 12 } else { h12 })
    })?;
    let minute = parsed.minute().unwrap_or(0);
    let second = parsed.second().unwrap_or(0);
    let nanos = parsed.subsecond().unwrap_or(0);
    Time::from_hms_nano(hour, minute, second, nanos).ok()
}

fn resolve_offset(parsed: &Parsed) -> Option<UtcOffset> {
    let hour = parsed.offset_hour()?;
    let minute = parsed.offset_minute_signed().unwrap_or(0);
    let minute = if hour < 0 { -minute.abs() } else { minute.abs() };
    UtcOffset::from_hms(hour, minute, 0).ok()
}

/// Resolves a two-digit year against the window starting fifty years ago.
fn sliding_window_year(last_two: i32) -> i32 {
    let base = OffsetDateTime::now_utc().year() - 50;
    let mut year = base - base.rem_euclid(100) + last_two;
    if year < base {
        year += 100;
    }
    year
}

fn translate(key: &str) -> Result<Translated> {
    let chars: Vec<char> = key.chars().collect();
    let mut out = Translated {
        desc: String::new(),
        classes: Vec::new(),
        has_date: false,
        has_time: false,
        has_zone: false,
        two_digit_year: false,
        fixed_shape: true,
    };
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() && c != 'T' {
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }
            translate_token(c, run, &mut out, key)?;
            i += run;
        } else {
            if c == '[' || c == ']' {
                return Err(Error::config(format!(
                    "pattern '{key}' contains a reserved character"
                )));
            }
            out.desc.push(c);
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.classes.push(Class::Literal(b));
            }
            i += 1;
        }
    }
    Ok(out)
}

fn translate_token(c: char, run: usize, out: &mut Translated, key: &str) -> Result<()> {
    let push_digits = |out: &mut Translated, n: usize| {
        out.classes.extend(std::iter::repeat_n(Class::Digit, n));
    };
    match (c, run) {
        ('y', 4) => {
            out.desc.push_str("[year]");
            push_digits(out, 4);
            out.has_date = true;
        }
        ('y', 2) => {
            out.desc.push_str("[year repr:last_two]");
            push_digits(out, 2);
            out.has_date = true;
            out.two_digit_year = true;
        }
        ('M', 3) => {
            out.desc.push_str("[month repr:short]");
            out.classes.extend(std::iter::repeat_n(Class::Letter, 3));
            out.has_date = true;
        }
        ('M', 2) => {
            out.desc.push_str("[month]");
            push_digits(out, 2);
            out.has_date = true;
        }
        ('M', 1) => {
            out.desc.push_str("[month padding:none]");
            push_digits(out, 1);
            out.has_date = true;
            out.fixed_shape = false;
        }
        ('d', 2) => {
            out.desc.push_str("[day]");
            push_digits(out, 2);
            out.has_date = true;
        }
        ('d', 1) => {
            out.desc.push_str("[day padding:none]");
            push_digits(out, 1);
            out.has_date = true;
            out.fixed_shape = false;
        }
        ('H', 2) => {
            out.desc.push_str("[hour]");
            push_digits(out, 2);
            out.has_time = true;
        }
        ('H', 1) => {
            out.desc.push_str("[hour padding:none]");
            push_digits(out, 1);
            out.has_time = true;
            out.fixed_shape = false;
        }
        ('h', 2) => {
            out.desc.push_str("[hour repr:12]");
            push_digits(out, 2);
            out.has_time = true;
        }
        ('m', 2) => {
            out.desc.push_str("[minute]");
            push_digits(out, 2);
            out.has_time = true;
        }
        ('s', 2) => {
            out.desc.push_str("[second]");
            push_digits(out, 2);
            out.has_time = true;
        }
        ('S', n @ 1..=9) => {
            use std::fmt::Write;
            let _ = write!(out.desc, "[subsecond digits:{n}]");
            push_digits(out, n);
            out.has_time = true;
        }
        ('a', 1) => {
            out.desc.push_str("[period]");
            out.classes.extend(std::iter::repeat_n(Class::Letter, 2));
            out.has_time = true;
        }
        ('X', 3) => {
            out.desc
                .push_str("[offset_hour sign:mandatory]:[offset_minute]");
            out.classes.push(Class::Sign);
            push_digits(out, 2);
            out.classes.push(Class::Literal(b':'));
            push_digits(out, 2);
            out.has_zone = true;
        }
        ('X', 2) | ('Z', 1) => {
            out.desc
                .push_str("[offset_hour sign:mandatory][offset_minute]");
            out.classes.push(Class::Sign);
            push_digits(out, 4);
            out.has_zone = true;
        }
        ('X', 1) => {
            out.desc.push_str("[offset_hour sign:mandatory]");
            out.classes.push(Class::Sign);
            push_digits(out, 2);
            out.has_zone = true;
        }
        _ => {
            return Err(Error::config(format!(
                "unsupported token '{}' (x{run}) in pattern '{key}'",
                c
            )));
        }
    }
    Ok(())
}

const DATE_ORDERS: [[&str; 3]; 3] = [
    ["yyyy", "MM", "dd"],
    ["MM", "dd", "yyyy"],
    ["dd", "MM", "yyyy"],
];

fn date_shapes() -> Vec<String> {
    let mut shapes = Vec::new();
    for month_token in ["MM", "MMM"] {
        for sep in ["-", "/", ""] {
            for order in DATE_ORDERS {
                let parts: Vec<&str> = order
                    .iter()
                    .map(|p| if *p == "MM" { month_token } else { *p })
                    .collect();
                shapes.push(parts.join(sep));
            }
        }
    }
    // Vendor habit: two-digit year with abbreviated month.
    shapes.push("dd-MMM-yy".to_owned());
    shapes
}

const TIME_SHAPES: [&str; 2] = ["HH:mm:ss", "hh:mm:ss a"];
const ZONE_SUFFIXES: [&str; 5] = ["", "XXX", " XXX", "Z", " Z"];

fn fraction_suffixes() -> Vec<String> {
    let mut v = vec![String::new()];
    for n in 1..=9 {
        v.push(format!(".{}", "S".repeat(n)));
    }
    v
}

fn build_datetime_library() -> Vec<Arc<Pattern>> {
    let mut patterns = Vec::new();
    let dates = date_shapes();
    for date in &dates {
        if let Ok(p) = Pattern::new(date) {
            patterns.push(Arc::new(p));
        }
    }
    let fractions = fraction_suffixes();
    for date in &dates {
        for sep in [" ", "T"] {
            for time in TIME_SHAPES {
                for frac in &fractions {
                    for zone in ZONE_SUFFIXES {
                        let key = format!("{date}{sep}{time}{frac}{zone}");
                        if let Ok(p) = Pattern::new(&key) {
                            patterns.push(Arc::new(p));
                        }
                    }
                }
            }
        }
    }
    patterns
}

fn build_time_library() -> Vec<Arc<Pattern>> {
    let mut patterns = Vec::new();
    let fractions = fraction_suffixes();
    for time in TIME_SHAPES {
        for frac in &fractions {
            for zone in ZONE_SUFFIXES {
                let key = format!("{time}{frac}{zone}");
                if let Ok(p) = Pattern::new(&key) {
                    patterns.push(Arc::new(p));
                }
            }
        }
    }
    patterns
}

fn datetime_library() -> &'static Arc<Vec<Arc<Pattern>>> {
    static LIBRARY: OnceLock<Arc<Vec<Arc<Pattern>>>> = OnceLock::new();
    LIBRARY.get_or_init(|| Arc::new(build_datetime_library()))
}

fn time_library() -> &'static Arc<Vec<Arc<Pattern>>> {
    static LIBRARY: OnceLock<Arc<Vec<Arc<Pattern>>>> = OnceLock::new();
    LIBRARY.get_or_init(|| Arc::new(build_time_library()))
}

/// Live pattern map plus the per-load runtime cache.
///
/// Starts from the static library (or a single pinned pattern). Winning
/// patterns are recorded in insertion order; once enough rows and hits
/// accumulate, the live list is swapped for the runtime cache between
/// rows, preserving first-match precedence.
pub struct TemporalFormats {
    live: Arc<Vec<Arc<Pattern>>>,
    runtime: Vec<Arc<Pattern>>,
    hits: u64,
    compacted: bool,
}

impl TemporalFormats {
    /// Formats map seeded with the full date/datetime library.
    #[must_use]
    pub fn datetime() -> Self {
        Self::from_library(Arc::clone(datetime_library()))
    }

    /// Formats map seeded with the time-only library.
    #[must_use]
    pub fn time_only() -> Self {
        Self::from_library(Arc::clone(time_library()))
    }

    const fn from_library(live: Arc<Vec<Arc<Pattern>>>) -> Self {
        Self {
            live,
            runtime: Vec::new(),
            hits: 0,
            compacted: false,
        }
    }

    /// Formats map pinned to a single configured pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern key does not compile.
    pub fn pinned(key: &str) -> Result<Self> {
        let pattern = Arc::new(Pattern::new(key)?);
        Ok(Self::from_library(Arc::new(vec![pattern])))
    }

    /// Appends another pinned pattern after the existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern key does not compile.
    pub fn with_pattern(self, key: &str) -> Result<Self> {
        let mut live: Vec<Arc<Pattern>> = self.live.as_ref().clone();
        live.push(Arc::new(Pattern::new(key)?));
        Ok(Self {
            live: Arc::new(live),
            ..self
        })
    }

    /// Attempts to parse `text` against the live map in insertion order.
    /// Trailing `Z`/`z` zone markers are normalised to explicit offsets
    /// so offset-style patterns can match them.
    pub fn parse(&mut self, text: &str) -> Option<Temporal> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(t) = self.parse_exact(trimmed) {
            return Some(t);
        }
        if trimmed.ends_with(['Z', 'z']) {
            let stem = &trimmed[..trimmed.len() - 1];
            for normalised in [format!("{stem}+00:00"), format!("{stem}+0000")] {
                if let Some(t) = self.parse_exact(&normalised) {
                    return Some(t);
                }
            }
        }
        None
    }

    fn parse_exact(&mut self, text: &str) -> Option<Temporal> {
        let live = Arc::clone(&self.live);
        for pattern in live.iter() {
            if !pattern.matches_shape(text) {
                continue;
            }
            if let Some(value) = pattern.parse(text) {
                self.record(pattern);
                return Some(value);
            }
        }
        None
    }

    fn record(&mut self, pattern: &Arc<Pattern>) {
        self.hits += 1;
        if !self
            .runtime
            .iter()
            .any(|p| std::ptr::eq(Arc::as_ptr(p), Arc::as_ptr(pattern)))
        {
            self.runtime.push(Arc::clone(pattern));
        }
    }

    /// Swaps the live map for the runtime cache once warmed up. Called
    /// between rows so the swap happens at a quiescent point.
    pub fn maybe_compact(&mut self, rows_decoded: u64) {
        if self.compacted
            || rows_decoded < COMPACT_MIN_ROWS
            || self.hits < COMPACT_MIN_HITS
            || self.runtime.is_empty()
        {
            return;
        }
        self.live = Arc::new(self.runtime.clone());
        self.compacted = true;
    }

    /// Whether the live map has been replaced by the runtime cache.
    #[must_use]
    pub const fn is_compacted(&self) -> bool {
        self.compacted
    }

    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn iso_date_round_trip() {
        let p = Pattern::new("yyyy-MM-dd").unwrap();
        assert!(p.matches_shape("2024-01-02"));
        assert_eq!(
            p.parse("2024-01-02"),
            Some(Temporal::Date(date!(2024 - 01 - 02)))
        );
        assert_eq!(p.format_date(date!(2024 - 01 - 02)).unwrap(), "2024-01-02");
    }

    #[test]
    fn datetime_with_millis() {
        let p = Pattern::new("yyyy-MM-dd HH:mm:ss.SSS").unwrap();
        assert_eq!(
            p.parse("2024-01-02 03:04:05.678"),
            Some(Temporal::DateTime(datetime!(2024-01-02 03:04:05.678)))
        );
        assert_eq!(
            p.format_datetime(datetime!(2024-01-02 03:04:05.678)).unwrap(),
            "2024-01-02 03:04:05.678"
        );
    }

    #[test]
    fn zoned_patterns() {
        let p = Pattern::new("yyyy-MM-dd HH:mm:ssXXX").unwrap();
        let got = p.parse("2024-01-02 03:04:05+02:00").unwrap();
        match got {
            Temporal::Zoned(odt) => {
                assert_eq!(odt.offset(), UtcOffset::from_hms(2, 0, 0).unwrap());
                assert_eq!(odt.time(), time!(03:04:05));
            }
            other => panic!("expected zoned, got {other:?}"),
        }
    }

    #[test]
    fn negative_offset_minutes() {
        let p = Pattern::new("yyyy-MM-dd HH:mm:ssXXX").unwrap();
        let got = p.parse("2024-01-02 03:04:05-05:30").unwrap();
        match got {
            Temporal::Zoned(odt) => {
                assert_eq!(odt.offset(), UtcOffset::from_hms(-5, -30, 0).unwrap());
            }
            other => panic!("expected zoned, got {other:?}"),
        }
    }

    #[test]
    fn twelve_hour_clock() {
        let p = Pattern::new("yyyy-MM-dd hh:mm:ss a").unwrap();
        assert_eq!(
            p.parse("2024-01-02 03:04:05 PM"),
            Some(Temporal::DateTime(datetime!(2024-01-02 15:04:05)))
        );
        assert_eq!(
            p.parse("2024-01-02 12:04:05 AM"),
            Some(Temporal::DateTime(datetime!(2024-01-02 00:04:05)))
        );
    }

    #[test]
    fn lenient_day_overflow_rolls_forward() {
        let p = Pattern::new("yyyy-MM-dd").unwrap();
        assert_eq!(
            p.parse("2023-02-30"),
            Some(Temporal::Date(date!(2023 - 03 - 02)))
        );
    }

    #[test]
    fn abbreviated_month() {
        let p = Pattern::new("dd-MMM-yyyy").unwrap();
        assert_eq!(
            p.parse("02-Jan-2024"),
            Some(Temporal::Date(date!(2024 - 01 - 02)))
        );
    }

    #[test]
    fn sliding_window_two_digit_year() {
        let now = OffsetDateTime::now_utc().year();
        let p = Pattern::new("dd-MMM-yy").unwrap();
        let Some(Temporal::Date(d)) = p.parse("02-Jan-99") else {
            panic!("expected a date");
        };
        assert_eq!(d.year() % 100, 99);
        assert!(d.year() >= now - 50 && d.year() < now + 50);
    }

    #[test]
    fn library_matches_common_shapes() {
        let mut formats = TemporalFormats::datetime();
        assert!(matches!(
            formats.parse("2024-01-02"),
            Some(Temporal::Date(_))
        ));
        assert!(matches!(
            formats.parse("2024-01-02 03:04:05"),
            Some(Temporal::DateTime(_))
        ));
        assert!(matches!(
            formats.parse("2024-01-02T03:04:05.123456"),
            Some(Temporal::DateTime(_))
        ));
        assert!(matches!(
            formats.parse("01/02/2024"),
            Some(Temporal::Date(_))
        ));
        assert!(matches!(
            formats.parse("2024-01-02 03:04:05Z"),
            Some(Temporal::Zoned(_))
        ));
        assert!(formats.parse("not a date").is_none());
    }

    #[test]
    fn time_only_library() {
        let mut formats = TemporalFormats::time_only();
        assert_eq!(
            formats.parse("03:04:05"),
            Some(Temporal::Time(time!(03:04:05)))
        );
        assert!(matches!(
            formats.parse("03:04:05.123+01:00"),
            Some(Temporal::TimeTz(_, _))
        ));
    }

    #[test]
    fn runtime_cache_compacts_after_warmup() {
        let mut formats = TemporalFormats::datetime();
        for _ in 0..COMPACT_MIN_HITS {
            assert!(formats.parse("2024-06-30 12:00:00").is_some());
        }
        assert!(!formats.is_compacted());
        formats.maybe_compact(COMPACT_MIN_ROWS);
        assert!(formats.is_compacted());
        // The compacted map still serves the winning pattern.
        assert!(formats.parse("2024-07-01 08:30:00").is_some());
        assert_eq!(formats.live.len(), 1);
    }

    #[test]
    fn pinned_pattern_is_exclusive() {
        let mut formats = TemporalFormats::pinned("dd/MM/yyyy").unwrap();
        assert!(formats.parse("02/01/2024").is_some());
        assert!(formats.parse("2024-01-02").is_none());
    }

    #[test]
    fn unknown_token_rejected() {
        assert!(Pattern::new("yyyy-QQ-dd").is_err());
    }
}
