//! In-process engine implementing the driver traits.
//!
//! Backs the integration tests and the CLI dry-run mode: loads execute
//! against real tables held in memory, batch failures can be scripted
//! per table, and cursors can replay fixed row sets with configurable
//! accessor support.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, FAILED_ROW, Result};
use crate::schema::DbColumn;
use crate::value::{Param, Value};

use super::{Accessor, ColumnMeta, Connection, Fetched, PreparedStatement, UpdateCounts, VendorCursor};

/// Decides the fate of a batch before it is applied. Returning `Some`
/// fails the batch with the given update counts and driver message.
pub type BatchPolicy = Box<dyn FnMut(&[Vec<Param>]) -> Option<(Vec<i64>, String)> + Send>;

#[derive(Default)]
struct Table {
    columns: Vec<DbColumn>,
    rows: Vec<Vec<Param>>,
    pending: Vec<Vec<Param>>,
}

#[derive(Default)]
struct Store {
    tables: HashMap<String, Table>,
    policies: HashMap<String, BatchPolicy>,
    commit_count: usize,
    statements: Vec<String>,
}

/// Shared in-memory database. Cheap to clone; clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryDb {
    store: Arc<Mutex<Store>>,
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: Vec<DbColumn>) {
        let mut store = self.store.lock().expect("memory store poisoned");
        store.tables.insert(
            name.to_ascii_uppercase(),
            Table {
                columns,
                rows: Vec::new(),
                pending: Vec::new(),
            },
        );
    }

    /// Scripts the outcome of future batches against `table`.
    pub fn set_batch_policy(&self, table: &str, policy: BatchPolicy) {
        let mut store = self.store.lock().expect("memory store poisoned");
        store.policies.insert(table.to_ascii_uppercase(), policy);
    }

    /// Committed rows of a table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Vec<Param>> {
        let store = self.store.lock().expect("memory store poisoned");
        store
            .tables
            .get(&table.to_ascii_uppercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of commits issued so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.store.lock().expect("memory store poisoned").commit_count
    }

    /// Standalone statements executed so far (DDL, TRUNCATE).
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.store
            .lock()
            .expect("memory store poisoned")
            .statements
            .clone()
    }

    #[must_use]
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            store: Arc::clone(&self.store),
            auto_commit: true,
        }
    }
}

/// Connection handle onto a [`MemoryDb`].
pub struct MemoryConnection {
    store: Arc<Mutex<Store>>,
    auto_commit: bool,
}

impl Connection for MemoryConnection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let table = insert_target(sql).ok_or_else(|| {
            Error::source(format!("memory engine cannot prepare: {sql}"))
        })?;
        let placeholders = sql.matches('?').count().max(
            (1..=64).take_while(|n| sql.contains(&format!(":{n}"))).count(),
        );
        {
            let store = self.store.lock().expect("memory store poisoned");
            if !store.tables.contains_key(&table) {
                return Err(Error::source(format!("table {table} does not exist")));
            }
        }
        Ok(Box::new(MemoryStatement {
            store: Arc::clone(&self.store),
            table,
            auto_commit: self.auto_commit,
            current: vec![Param::Null; placeholders],
            bound: vec![false; placeholders],
            batch: Vec::new(),
        }))
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut store = self.store.lock().expect("memory store poisoned");
        store.statements.push(sql.to_owned());
        let trimmed = sql.trim();
        let upper = trimmed.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("TRUNCATE TABLE ") {
            let name = unquote(rest.trim()).to_ascii_uppercase();
            let table = store
                .tables
                .get_mut(&name)
                .ok_or_else(|| Error::source(format!("table {name} does not exist")))?;
            let n = table.rows.len() as u64;
            table.rows.clear();
            table.pending.clear();
            return Ok(n);
        }
        if upper.starts_with("CREATE TABLE ") {
            let (name, columns) = parse_create_table(trimmed)?;
            store.tables.insert(
                name,
                Table {
                    columns,
                    rows: Vec::new(),
                    pending: Vec::new(),
                },
            );
            return Ok(0);
        }
        Err(Error::source(format!(
            "memory engine cannot execute: {trimmed}"
        )))
    }

    fn commit(&mut self) -> Result<()> {
        let mut store = self.store.lock().expect("memory store poisoned");
        for table in store.tables.values_mut() {
            let pending = std::mem::take(&mut table.pending);
            table.rows.extend(pending);
        }
        store.commit_count += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut store = self.store.lock().expect("memory store poisoned");
        for table in store.tables.values_mut() {
            table.pending.clear();
        }
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, on: bool) -> Result<()> {
        self.auto_commit = on;
        Ok(())
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<DbColumn>> {
        let store = self.store.lock().expect("memory store poisoned");
        store
            .tables
            .get(&table.to_ascii_uppercase())
            .map(|t| t.columns.clone())
            .ok_or_else(|| Error::source(format!("table {table} does not exist")))
    }

    fn query_columns(&mut self, sql: &str) -> Result<Vec<DbColumn>> {
        // The fixture engine resolves the first registered table whose
        // name appears in the query text.
        let store = self.store.lock().expect("memory store poisoned");
        let upper = sql.to_ascii_uppercase();
        store
            .tables
            .iter()
            .find(|(name, _)| upper.contains(name.as_str()))
            .map(|(_, t)| t.columns.clone())
            .ok_or_else(|| Error::source(format!("no table matches column query: {sql}")))
    }
}

struct MemoryStatement {
    store: Arc<Mutex<Store>>,
    table: String,
    auto_commit: bool,
    current: Vec<Param>,
    bound: Vec<bool>,
    batch: Vec<Vec<Param>>,
}

impl PreparedStatement for MemoryStatement {
    fn bind(&mut self, position: usize, param: Param) -> Result<()> {
        if position == 0 || position > self.current.len() {
            return Err(Error::source(format!(
                "bind position {position} out of range 1..={}",
                self.current.len()
            )));
        }
        self.current[position - 1] = param;
        self.bound[position - 1] = true;
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        if self.bound.iter().any(|b| !b) {
            return Err(Error::source("not all parameters bound"));
        }
        self.batch.push(std::mem::replace(
            &mut self.current,
            vec![Param::Null; self.bound.len()],
        ));
        self.bound.fill(false);
        Ok(())
    }

    fn batch_len(&self) -> usize {
        self.batch.len()
    }

    fn execute_batch(&mut self) -> Result<UpdateCounts> {
        let batch = std::mem::take(&mut self.batch);
        let mut store = self.store.lock().expect("memory store poisoned");
        let verdict = store
            .policies
            .get_mut(&self.table)
            .and_then(|policy| policy(&batch));

        match verdict {
            None => {
                let table = store
                    .tables
                    .get_mut(&self.table)
                    .ok_or_else(|| Error::source(format!("table {} vanished", self.table)))?;
                let counts = vec![1; batch.len()];
                if self.auto_commit {
                    table.rows.extend(batch);
                } else {
                    table.pending.extend(batch);
                }
                Ok(counts)
            }
            Some((counts, message)) => {
                let table = store
                    .tables
                    .get_mut(&self.table)
                    .ok_or_else(|| Error::source(format!("table {} vanished", self.table)))?;
                for (i, row) in batch.into_iter().enumerate() {
                    if counts.get(i).is_some_and(|c| *c != FAILED_ROW) {
                        if self.auto_commit {
                            table.rows.push(row);
                        } else {
                            table.pending.push(row);
                        }
                    }
                }
                Err(Error::Batch {
                    details: message.into(),
                    update_counts: counts,
                })
            }
        }
    }
}

fn insert_target(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let rest = upper.trim_start().strip_prefix("INSERT INTO")?.trim_start();
    let end = rest.find(['(', ' ', '\n'])?;
    Some(unquote(rest[..end].trim()).to_ascii_uppercase())
}

fn unquote(ident: &str) -> &str {
    ident
        .trim_matches('"')
        .trim_matches('`')
        .trim_start_matches('[')
        .trim_end_matches(']')
}

fn parse_create_table(sql: &str) -> Result<(String, Vec<DbColumn>)> {
    let open = sql
        .find('(')
        .ok_or_else(|| Error::source("CREATE TABLE without column list"))?;
    let close = sql
        .rfind(')')
        .ok_or_else(|| Error::source("CREATE TABLE without closing parenthesis"))?;
    let head = sql[..open].trim();
    let name = head
        .rsplit(char::is_whitespace)
        .next()
        .ok_or_else(|| Error::source("CREATE TABLE without a table name"))?;
    let name = unquote(name).to_ascii_uppercase();

    let mut columns = Vec::new();
    let mut depth = 0usize;
    let mut entry = String::new();
    for ch in sql[open + 1..close].chars() {
        match ch {
            '(' => {
                depth += 1;
                entry.push(ch);
            }
            ')' => {
                depth -= 1;
                entry.push(ch);
            }
            ',' if depth == 0 => {
                push_column(&mut columns, &entry)?;
                entry.clear();
            }
            _ => entry.push(ch),
        }
    }
    if !entry.trim().is_empty() {
        push_column(&mut columns, &entry)?;
    }
    Ok((name, columns))
}

fn push_column(columns: &mut Vec<DbColumn>, entry: &str) -> Result<()> {
    let entry = entry.trim();
    let (name, ty) = entry
        .split_once(char::is_whitespace)
        .ok_or_else(|| Error::source(format!("column entry '{entry}' has no type")))?;
    let ty = ty.trim();
    let (type_name, size) = match ty.split_once('(') {
        Some((base, rest)) => {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            (base.trim().to_owned(), digits.parse::<i64>().unwrap_or(0))
        }
        None => (ty.to_owned(), 0),
    };
    columns.push(DbColumn {
        name: unquote(name).to_ascii_uppercase(),
        data_type: vendor_code_for_type_name(&type_name),
        type_name: type_name.to_ascii_uppercase(),
        size,
    });
    Ok(())
}

/// Maps a DDL type name onto the generic vendor codes.
#[must_use]
pub fn vendor_code_for_type_name(name: &str) -> i32 {
    use crate::schema::type_code as t;
    match name.trim().to_ascii_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => t::BOOLEAN,
        "TINYINT" => t::TINYINT,
        "SMALLINT" => t::SMALLINT,
        "INT" | "INTEGER" => t::INTEGER,
        "BIGINT" | "INT8" => t::BIGINT,
        "REAL" => t::REAL,
        "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "BINARY_DOUBLE" => t::DOUBLE,
        "NUMERIC" => t::NUMERIC,
        "DECIMAL" | "NUMBER" | "DEC" => t::DECIMAL,
        "CHAR" | "NCHAR" => t::CHAR,
        "VARCHAR" | "VARCHAR2" | "NVARCHAR" | "NVARCHAR2" | "TEXT" => t::VARCHAR,
        "CLOB" | "NCLOB" | "LONGTEXT" => t::CLOB,
        "DATE" => t::DATE,
        "TIME" => t::TIME,
        "TIMETZ" | "TIME WITH TIME ZONE" => t::TIME_WITH_TIMEZONE,
        "TIMESTAMP" | "DATETIME" | "DATETIME2" => t::TIMESTAMP,
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => t::TIMESTAMP_WITH_TIMEZONE,
        "BINARY" | "VARBINARY" | "RAW" | "BYTEA" => t::BINARY,
        "BLOB" | "LONGBLOB" => t::BLOB,
        "XML" | "XMLTYPE" => t::SQLXML,
        "JSON" | "JSONB" => t::JSON,
        "VECTOR" => t::VECTOR,
        _ => t::OTHER,
    }
}

/// Replays a fixed set of typed rows as a [`VendorCursor`].
///
/// Accessor support follows the stored value variants, so tag-driven
/// fallback chains in the row source are exercised the same way they
/// would be against a real driver.
pub struct MemoryCursor {
    columns: Vec<ColumnMeta>,
    class_names: Vec<Option<String>>,
    rows: std::collections::VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    last_null: bool,
    fail_after: Option<usize>,
    advanced: usize,
    closed: bool,
}

impl MemoryCursor {
    #[must_use]
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        let class_names = vec![None; columns.len()];
        Self {
            columns,
            class_names,
            rows: rows.into(),
            current: None,
            last_null: false,
            fail_after: None,
            advanced: 0,
            closed: false,
        }
    }

    /// Reports a vendor class name for one column, as a driver would
    /// after the first non-null fetch.
    #[must_use]
    pub fn with_class_name(mut self, index: usize, class: &str) -> Self {
        self.class_names[index] = Some(class.to_owned());
        self
    }

    /// Makes `advance` fail after `n` successful advances.
    #[must_use]
    pub const fn with_error_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl VendorCursor for MemoryCursor {
    fn columns(&mut self) -> Result<Vec<ColumnMeta>> {
        Ok(self.columns.clone())
    }

    fn set_fetch_size(&mut self, _rows: usize) {}

    fn advance(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.fail_after == Some(self.advanced) {
            return Err(Error::source("simulated cursor failure"));
        }
        self.current = self.rows.pop_front();
        if self.current.is_some() {
            self.advanced += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn read(&mut self, index: usize, accessor: Accessor) -> Result<Fetched> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| Error::source("read before advance"))?;
        let value = row
            .get(index)
            .ok_or_else(|| Error::source(format!("column index {index} out of range")))?;
        self.last_null = value.is_null();
        if self.last_null {
            return Ok(Fetched::Value(Value::Null));
        }
        let fetched = match (accessor, value) {
            (Accessor::Object, v) => Fetched::Value(v.clone()),
            (Accessor::String, Value::Str(_))
            | (Accessor::Clob, Value::Str(_))
            | (Accessor::Xml, Value::Str(_)) => Fetched::Value(value.clone()),
            (Accessor::Blob, Value::Bytes(_)) => Fetched::Value(value.clone()),
            (Accessor::Date, Value::Date(_)) => Fetched::Value(value.clone()),
            (Accessor::Time, Value::Time(_)) => Fetched::Value(value.clone()),
            (Accessor::Timestamp, Value::DateTime(_) | Value::Date(_)) => {
                Fetched::Value(value.clone())
            }
            (
                Accessor::ZonedTimestamp | Accessor::OffsetTimestamp,
                Value::ZonedDateTime(_),
            ) => Fetched::Value(value.clone()),
            (Accessor::Vector, Value::Vector(_)) => Fetched::Value(value.clone()),
            _ => Fetched::Unsupported,
        };
        Ok(fetched)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn column_class(&self, index: usize) -> Option<String> {
        self.class_names.get(index).cloned().flatten()
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
        self.current = None;
    }
}
