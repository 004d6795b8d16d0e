//! CSV-to-table loader.
//!
//! One load walks `READY → OPEN → SCHEMA_RESOLVED → LOAD_BATCH* → DONE`
//! (or `ABORTED` once the error cap trips): resolve the file charset,
//! optionally infer and create the table, match CSV header slots to
//! table columns, then stream rows into a batched prepared statement.
//! Rows that fail to bind and rows rejected by a batch execute divert
//! to the `.bad` sidecar and count against the error cap.

pub mod ddl;
pub mod options;

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use csv::{Reader, ReaderBuilder, StringRecord, WriterBuilder};
use encoding_rs::Encoding;
use log::debug;

use crate::codec::Decoder;
use crate::db::{Connection, PreparedStatement};
use crate::detect::{DecodingReader, detect_charset, resolve_encoding};
use crate::error::{Error, FAILED_ROW, Result};
use crate::logger::Logger;
use crate::schema::{DbColumn, SqlType};

use options::{LoaderOptions, Show, SkipColumns};

/// Bytes sampled from the head of the file for charset detection.
const DETECT_SAMPLE: usize = 8 * 1024;

/// Counters for one load invocation.
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    /// Data rows processed (bound or diverted).
    pub total_rows: u64,
    /// Rows diverted to the `.bad` sidecar.
    pub total_errors: u64,
    /// Approximate input bytes processed.
    pub total_bytes: u64,
    /// Rows committed to the table.
    pub committed: u64,
    pub elapsed_secs: f64,
}

struct LoadColumn {
    csv_index: usize,
    db_name: String,
    sql_type: SqlType,
}

/// Sidecar writer for rejected rows: same dialect as the input, the
/// header row first when the input has one, then an `[ERROR] …` marker
/// row before each diverted row. Created lazily on the first failure;
/// a stale file from an earlier run is deleted up front.
struct BadFile {
    path: PathBuf,
    delimiter: u8,
    quote: u8,
    header: Option<StringRecord>,
    writer: Option<csv::Writer<File>>,
}

impl BadFile {
    fn new(input: &Path, delimiter: u8, quote: u8, header: Option<StringRecord>) -> Self {
        let mut name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".bad");
        let path = input.with_file_name(name);
        let _ = std::fs::remove_file(&path);
        Self {
            path,
            delimiter,
            quote,
            header,
            writer: None,
        }
    }

    fn write(&mut self, record: &StringRecord, message: &str) -> Result<()> {
        if self.writer.is_none() {
            let file = File::create(&self.path)?;
            let mut writer = WriterBuilder::new()
                .delimiter(self.delimiter)
                .quote(self.quote)
                .flexible(true)
                .from_writer(file);
            if let Some(header) = &self.header {
                writer.write_record(header)?;
            }
            self.writer = Some(writer);
        }
        let writer = self.writer.as_mut().expect("bad writer just created");
        let first_line = message.lines().next().unwrap_or("");
        writer.write_record([format!("[ERROR] {first_line}")])?;
        writer.write_record(record)?;
        writer.flush()?;
        Ok(())
    }
}

struct RunState {
    decoder: Decoder,
    stats: LoadStats,
    bad: BadFile,
    last_progress_bytes: u64,
}

/// Drives CSV files into a table through a [`Connection`].
pub struct Loader {
    options: LoaderOptions,
    logger: Logger,
}

impl Loader {
    #[must_use]
    pub const fn new(options: LoaderOptions, logger: Logger) -> Self {
        Self { options, logger }
    }

    #[must_use]
    pub const fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Runs one load. Returns the final counters; the same numbers go
    /// to the logger as a summary line.
    ///
    /// # Errors
    ///
    /// Schema mismatches, fatal driver errors, and the error cap all
    /// unwind here, after auto-commit is restored and the sidecar is
    /// flushed.
    pub fn load(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        input: &Path,
    ) -> Result<LoadStats> {
        let start = Instant::now();
        if !input.is_file() {
            return Err(Error::config(format!(
                "input file {} does not exist",
                input.display()
            )));
        }
        let encoding = self.resolve_charset(input)?;
        debug!("loading {} as {}", input.display(), encoding.name());

        if self.options.show != Show::Off {
            return self.show_only(conn, table, input, encoding);
        }

        if self.options.create {
            let (names, sample) = self.scan_sample(input, encoding)?;
            let statement = ddl::infer_create_table(&self.options, table, &names, &sample);
            conn.execute(&statement)?;
        }
        if self.options.truncate {
            conn.execute(&format!(
                "TRUNCATE TABLE {}",
                self.options.platform.quote(table)
            ))?;
        }

        // OPEN
        let (mut reader, header) = self.open_csv(input, encoding)?;
        let bad = BadFile::new(
            input,
            self.options.delimiter as u8,
            self.options.enclosure as u8,
            header.clone(),
        );

        // SCHEMA_RESOLVED
        let db_columns = self.fetch_columns(conn, table)?;
        let csv_names: Vec<String> = header.as_ref().map_or_else(
            || db_columns.iter().map(|c| c.name.clone()).collect(),
            |h| h.iter().map(|f| f.trim().to_owned()).collect(),
        );
        let plan = self.resolve_columns(&csv_names, &db_columns)?;
        let insert_sql = self.build_insert(table, &plan);
        debug!("resolved {} of {} csv columns", plan.len(), csv_names.len());

        let mut state = RunState {
            decoder: Decoder::new(&self.options.codec_config())?,
            stats: LoadStats::default(),
            bad,
            last_progress_bytes: 0,
        };

        // LOAD_BATCH, with auto-commit restored on every exit path.
        let original_auto_commit = conn.auto_commit();
        conn.set_auto_commit(false)?;
        let outcome = self.run_batches(conn, &insert_sql, &plan, &mut reader, &mut state);
        if outcome.is_err() {
            let _ = conn.rollback();
        }
        let restored = conn.set_auto_commit(original_auto_commit);
        outcome?;
        restored?;

        // DONE
        let mut stats = state.stats;
        stats.elapsed_secs = start.elapsed().as_secs_f64();
        let mib = stats.total_bytes as f64 / (1024.0 * 1024.0);
        let rate = if stats.elapsed_secs > 0.0 {
            mib / stats.elapsed_secs
        } else {
            0.0
        };
        self.logger.line(&format!(
            "Loaded {} rows in {:.3}s: {} inserted, {} rejected, {:.2} MiB ({:.2} MiB/s)",
            stats.total_rows,
            stats.elapsed_secs,
            stats.committed,
            stats.total_errors,
            mib,
            rate
        ))?;
        Ok(stats)
    }

    /// `SHOW` mode: emit the requested statements, execute nothing.
    fn show_only(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        input: &Path,
        encoding: &'static Encoding,
    ) -> Result<LoadStats> {
        if self.options.show.includes_ddl() {
            let (names, sample) = self.scan_sample(input, encoding)?;
            let statement = ddl::infer_create_table(&self.options, table, &names, &sample);
            self.logger.line(&statement)?;
        }
        if self.options.show.includes_dml() {
            if self.options.truncate {
                self.logger.line(&format!(
                    "TRUNCATE TABLE {}",
                    self.options.platform.quote(table)
                ))?;
            }
            let plan = match self.fetch_columns(conn, table) {
                Ok(db_columns) => {
                    let (names, _) = self.scan_sample(input, encoding)?;
                    self.resolve_columns(&names, &db_columns)?
                }
                Err(_) => {
                    // No table yet; template from the CSV header alone.
                    let (names, _) = self.scan_sample(input, encoding)?;
                    names
                        .iter()
                        .enumerate()
                        .map(|(i, name)| LoadColumn {
                            csv_index: i,
                            db_name: name.clone(),
                            sql_type: SqlType::Varchar,
                        })
                        .collect()
                }
            };
            self.logger.line(&self.build_insert(table, &plan))?;
        }
        Ok(LoadStats::default())
    }

    fn resolve_charset(&self, input: &Path) -> Result<&'static Encoding> {
        if let Some(encoding) = resolve_encoding(&self.options.encoding) {
            return Ok(encoding);
        }
        if !self.options.encoding.is_empty()
            && !self.options.encoding.eq_ignore_ascii_case("auto")
        {
            return Err(Error::config(format!(
                "unknown ENCODING '{}'",
                self.options.encoding
            )));
        }
        let mut head = vec![0u8; DETECT_SAMPLE];
        let mut file = File::open(input)?;
        let n = file.read(&mut head)?;
        head.truncate(n);
        Ok(detect_charset(&head))
    }

    fn open_csv(
        &self,
        input: &Path,
        encoding: &'static Encoding,
    ) -> Result<(Reader<DecodingReader<File>>, Option<StringRecord>)> {
        for (name, c) in [
            ("DELIMITER", self.options.delimiter),
            ("ENCLOSURE", self.options.enclosure),
            ("ESCAPE", self.options.escape),
        ] {
            if !c.is_ascii() {
                return Err(Error::config(format!("{name} must be an ASCII character")));
            }
        }
        let file = File::open(input)?;
        let decoded = DecodingReader::new(file, encoding);
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.options.delimiter as u8)
            .quote(self.options.enclosure as u8)
            .has_headers(false)
            .flexible(true);
        if self.options.escape != self.options.enclosure {
            builder.escape(Some(self.options.escape as u8));
        }
        let mut reader = builder.from_reader(decoded);

        let mut record = StringRecord::new();
        for _ in 0..self.options.skip_rows {
            if !reader.read_record(&mut record)? {
                break;
            }
        }
        let header = if self.options.has_header && reader.read_record(&mut record)? {
            Some(record.clone())
        } else {
            None
        };
        Ok((reader, header))
    }

    /// Reads up to `scan_rows` non-empty rows for type inference.
    fn scan_sample(
        &self,
        input: &Path,
        encoding: &'static Encoding,
    ) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let (mut reader, header) = self.open_csv(input, encoding)?;
        let mut sample: Vec<Vec<String>> = Vec::new();
        let mut record = StringRecord::new();
        while sample.len() < self.options.scan_rows && reader.read_record(&mut record)? {
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            sample.push(record.iter().map(std::borrow::ToOwned::to_owned).collect());
        }
        let width = header
            .as_ref()
            .map(StringRecord::len)
            .or_else(|| sample.first().map(Vec::len))
            .unwrap_or(0);
        let names: Vec<String> = header.map_or_else(
            || (1..=width).map(|i| format!("COL{i}")).collect(),
            |h| h.iter().map(|f| f.trim().to_owned()).collect(),
        );
        Ok((names, sample))
    }

    fn fetch_columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<DbColumn>> {
        match &self.options.column_info_sql {
            Some(sql) => conn.query_columns(sql),
            None => conn.table_columns(table),
        }
    }

    fn resolve_columns(
        &self,
        csv_names: &[String],
        db_columns: &[DbColumn],
    ) -> Result<Vec<LoadColumn>> {
        let lookup: HashMap<String, &DbColumn> = db_columns
            .iter()
            .map(|c| (c.name.to_ascii_uppercase(), c))
            .collect();
        let mut plan = Vec::new();
        for (i, raw) in csv_names.iter().enumerate() {
            let name = raw.trim();
            let upper = name.to_ascii_uppercase();
            let mapped = self
                .options
                .map_column_names
                .get(&upper)
                .map_or(name, String::as_str);
            if let Some(db) = lookup.get(&mapped.to_ascii_uppercase()) {
                plan.push(LoadColumn {
                    csv_index: i,
                    db_name: db.name.clone(),
                    sql_type: SqlType::from_vendor_code(db.data_type),
                });
                continue;
            }
            let skippable = match &self.options.skip_columns {
                SkipColumns::Auto => true,
                SkipColumns::Off => false,
                SkipColumns::Named(set) => {
                    set.contains(&upper) || set.contains(&mapped.to_ascii_uppercase())
                }
            };
            if !skippable {
                return Err(Error::SchemaMismatch {
                    column: name.to_owned(),
                });
            }
        }
        if plan.is_empty() {
            return Err(Error::config("no CSV column matches the target table"));
        }
        Ok(plan)
    }

    fn build_insert(&self, table: &str, plan: &[LoadColumn]) -> String {
        let dialect = self.options.platform;
        let columns: Vec<String> = plan.iter().map(|c| dialect.quote(&c.db_name)).collect();
        let placeholders: Vec<String> = (1..=plan.len())
            .map(|n| self.options.placeholder(n))
            .collect();
        format!(
            "INSERT INTO {}({}) VALUES ({})",
            dialect.quote(table),
            columns.join(","),
            placeholders.join(",")
        )
    }

    fn run_batches(
        &self,
        conn: &mut dyn Connection,
        insert_sql: &str,
        plan: &[LoadColumn],
        reader: &mut Reader<DecodingReader<File>>,
        state: &mut RunState,
    ) -> Result<()> {
        let mut stmt = conn.prepare(insert_sql)?;
        let mut pending: Vec<StringRecord> = Vec::with_capacity(self.options.batch_rows);
        let mut record = StringRecord::new();

        loop {
            if self.options.row_limit > 0 && state.stats.total_rows >= self.options.row_limit {
                break;
            }
            if !reader.read_record(&mut record)? {
                break;
            }
            state.stats.total_bytes +=
                estimate_record_bytes(&record, self.options.delimiter, self.options.enclosure);
            state.stats.total_rows += 1;

            let mut bound = true;
            for (position, column) in plan.iter().enumerate() {
                let field = record.get(column.csv_index).unwrap_or("");
                match state.decoder.decode(field, column.sql_type) {
                    Ok(param) => stmt.bind(position + 1, param)?,
                    Err(e) if e.is_row_recoverable() => {
                        debug!("row {} rejected: {e}", state.stats.total_rows);
                        self.record_error(state, &record, &e.to_string())?;
                        bound = false;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            state.decoder.note_row();
            if !bound {
                continue;
            }
            stmt.add_batch()?;
            pending.push(record.clone());

            if stmt.batch_len() >= self.options.batch_rows {
                self.execute_batch(conn, stmt.as_mut(), &mut pending, state)?;
                self.maybe_progress(state)?;
            }
        }

        if stmt.batch_len() > 0 {
            self.execute_batch(conn, stmt.as_mut(), &mut pending, state)?;
        }
        Ok(())
    }

    /// Executes and commits one batch. Per-row rejections divert to the
    /// sidecar; a row index past the reported successful prefix counts
    /// as rejected too.
    fn execute_batch(
        &self,
        conn: &mut dyn Connection,
        stmt: &mut dyn PreparedStatement,
        pending: &mut Vec<StringRecord>,
        state: &mut RunState,
    ) -> Result<()> {
        let size = stmt.batch_len() as u64;
        match stmt.execute_batch() {
            Ok(_) => {
                conn.commit()?;
                state.stats.committed += size;
                pending.clear();
                Ok(())
            }
            Err(Error::Batch {
                details,
                update_counts,
            }) => {
                let mut rejected = 0u64;
                let mut cap_hit = None;
                for (i, rec) in pending.iter().enumerate() {
                    let failed = update_counts
                        .get(i)
                        .is_none_or(|count| *count == FAILED_ROW);
                    if failed {
                        rejected += 1;
                        if let Err(e) = self.record_error(state, rec, &details) {
                            cap_hit = Some(e);
                            break;
                        }
                    }
                }
                let first_line = details.lines().next().unwrap_or("");
                self.logger.line(&format!(
                    "Batch of {size} rows: {rejected} rejected ({first_line})"
                ))?;
                conn.commit()?;
                state.stats.committed += size - rejected;
                pending.clear();
                match cap_hit {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Counts one diverted row and enforces the error cap.
    fn record_error(
        &self,
        state: &mut RunState,
        record: &StringRecord,
        message: &str,
    ) -> Result<()> {
        state.stats.total_errors += 1;
        state.bad.write(record, message)?;
        if self.options.errors >= 0 && state.stats.total_errors > self.options.errors as u64 {
            return Err(Error::ErrorLimit {
                limit: self.options.errors as u64,
            });
        }
        Ok(())
    }

    fn maybe_progress(&self, state: &mut RunState) -> Result<()> {
        if self.options.report_mb < 0 {
            return Ok(());
        }
        let interval = (self.options.report_mb as u64) * 1024 * 1024;
        if state.stats.total_bytes.saturating_sub(state.last_progress_bytes) >= interval {
            state.last_progress_bytes = state.stats.total_bytes;
            let mib = state.stats.total_bytes as f64 / (1024.0 * 1024.0);
            self.logger.line(&format!(
                "Progress: {} rows, {} errors, {mib:.1} MiB",
                state.stats.total_rows, state.stats.total_errors
            ))?;
        }
        Ok(())
    }
}

/// Approximate wire size of a record: one byte per delimiter, two per
/// character, two for the row terminator, two per nominal null, and
/// quote overhead where a field would need enclosing.
fn estimate_record_bytes(record: &StringRecord, delimiter: char, quote: char) -> u64 {
    let mut bytes: u64 = 2; // row terminator
    let fields = record.len();
    bytes += fields.saturating_sub(1) as u64;
    for field in record {
        if field.is_empty() {
            bytes += 2;
            continue;
        }
        let chars = field.chars().count() as u64;
        bytes += chars * 2;
        let escaped = field
            .chars()
            .filter(|c| *c == quote || *c == '\\')
            .count() as u64;
        let needs_quote = field
            .chars()
            .any(|c| c == delimiter || c == quote || c == '\r' || c == '\n');
        if needs_quote {
            bytes += 2 + escaped;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_byte_estimate() {
        let record = StringRecord::from(vec!["1", "a,b", ""]);
        // 2 (terminator) + 2 (delims) + 2 + (6+2) + 2
        assert_eq!(estimate_record_bytes(&record, ',', '"'), 16);
    }

    #[test]
    fn bad_file_path_appends_suffix() {
        let bad = BadFile::new(Path::new("/tmp/in.csv"), b',', b'"', None);
        assert_eq!(bad.path, PathBuf::from("/tmp/in.csv.bad"));
    }
}
