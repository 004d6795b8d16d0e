use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tabflow::db::memory::MemoryDb;
use tabflow::schema::{DbColumn, type_code};

/// Writes `content` into a fresh temp dir and returns (dir, file path).
pub fn write_input(name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write input");
    (dir, path)
}

pub fn column(name: &str, data_type: i32, size: i64) -> DbColumn {
    let type_name = match data_type {
        type_code::INTEGER => "INTEGER",
        type_code::DECIMAL => "DECIMAL",
        type_code::VARCHAR => "VARCHAR",
        type_code::TIMESTAMP => "TIMESTAMP",
        type_code::DATE => "DATE",
        type_code::BOOLEAN => "BOOLEAN",
        _ => "OTHER",
    };
    DbColumn {
        name: name.to_owned(),
        data_type,
        type_name: type_name.to_owned(),
        size,
    }
}

/// An `ID INTEGER, AMOUNT DECIMAL(10,2)` table on a fresh engine.
pub fn id_amount_db(table: &str) -> MemoryDb {
    let db = MemoryDb::new();
    db.create_table(
        table,
        vec![
            column("ID", type_code::INTEGER, 10),
            column("AMOUNT", type_code::DECIMAL, 10),
        ],
    );
    db
}

/// Shared in-memory logger sink for asserting on progress output.
#[derive(Clone, Default)]
pub struct CapturedLog(pub Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("log lock");
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
