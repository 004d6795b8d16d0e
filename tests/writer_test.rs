mod common;

use std::io::Read;

use tabflow::codec::{CodecConfig, Encoder};
use tabflow::db::ColumnMeta;
use tabflow::db::memory::MemoryCursor;
use tabflow::schema::type_code;
use tabflow::value::Value;
use tabflow::{
    CancelToken, CsvLineFormatter, FileSink, RowSource, RowWriter, SqlInsertFormatter,
    WriteContext, WriteOptions,
};

fn meta(name: &str, code: i32) -> ColumnMeta {
    ColumnMeta {
        name: name.into(),
        vendor_type: code,
        size: 0,
    }
}

fn sample_rows() -> (Vec<ColumnMeta>, Vec<Vec<Value>>) {
    let metas = vec![
        meta("ID", type_code::INTEGER),
        meta("NOTE", type_code::VARCHAR),
        meta("EVT", type_code::TIMESTAMP),
    ];
    let rows = vec![
        vec![Value::Int(1), Value::Str("a,b".into()), Value::Null],
        vec![
            Value::Int(2),
            Value::Str("say \"hi\"".into()),
            // Encodes with the default timestamp pattern; the all-zero
            // fraction is stripped.
            Value::DateTime(time::macros::datetime!(2024-01-02 03:04:05)),
        ],
        vec![Value::Int(3), Value::Str(String::new()), Value::Int(0)],
    ];
    (metas, rows)
}

#[test]
fn csv_bytes_match_expected_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let (metas, rows) = sample_rows();
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, rows)), 100).unwrap();
    let sink = FileSink::create(&path, 64 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(WriteContext::default())));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    let written = writer
        .write_all(source, &encoder, &CancelToken::new(), &WriteOptions::default())
        .unwrap();
    assert_eq!(written, 3);
    writer.finish().unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "1,\"a,b\",\n2,\"say \"\"hi\"\"\",2024-01-02 03:04:05\n3,,0\n"
    );
}

#[test]
fn gzip_output_decompresses_to_same_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv.gz");
    let (metas, rows) = sample_rows();
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, rows)), 100).unwrap();
    let sink = FileSink::create(&path, 64 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(WriteContext::default())));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    writer
        .write_all(source, &encoder, &CancelToken::new(), &WriteOptions::default())
        .unwrap();
    writer.finish().unwrap();

    let mut decoder = flate2::read::GzDecoder::new(std::fs::File::open(&path).unwrap());
    let mut out = String::new();
    decoder.read_to_string(&mut out).unwrap();
    assert_eq!(
        out,
        "1,\"a,b\",\n2,\"say \"\"hi\"\"\",2024-01-02 03:04:05\n3,,0\n"
    );
}

#[test]
fn zip_output_holds_single_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv.zip");
    let (metas, rows) = sample_rows();
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, rows)), 100).unwrap();
    let sink = FileSink::create(&path, 64 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(WriteContext::default())));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    writer
        .write_all(
            source,
            &encoder,
            &CancelToken::new(),
            &WriteOptions {
                include_header: true,
                ..WriteOptions::default()
            },
        )
        .unwrap();
    writer.finish().unwrap();

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "report.csv");
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    assert!(text.starts_with("ID,NOTE,EVT\n"));
    assert!(text.ends_with("3,,0\n"));
}

#[test]
fn insert_script_with_wrapping_and_quoting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("load.sql");
    let metas = vec![
        meta("ID", type_code::INTEGER),
        meta("NAME", type_code::VARCHAR),
        meta("PRICE", type_code::DECIMAL),
    ];
    let rows = vec![
        vec![
            Value::Int(1),
            Value::Str("o'neill".into()),
            Value::Decimal("9.90".parse().unwrap()),
        ],
        vec![Value::Int(2), Value::Null, Value::Null],
    ];
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, rows)), 100).unwrap();
    let sink = FileSink::create(&path, 64 * 1024, "sql").unwrap();
    let formatter = SqlInsertFormatter::new(WriteContext::default(), "items", source.columns());
    let mut writer = RowWriter::new(sink, Box::new(formatter));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    writer
        .write_all(source, &encoder, &CancelToken::new(), &WriteOptions::default())
        .unwrap();
    writer.finish().unwrap();

    let got = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        got,
        "INSERT INTO items(ID,NAME,PRICE) VALUES (1,'o''neill',9.9);\n\
         INSERT INTO items(ID,NAME,PRICE) VALUES (2,null,null);\n"
    );
}

#[test]
fn excluded_and_remapped_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let metas = vec![
        meta("KEEP", type_code::INTEGER),
        meta("DROP", type_code::VARCHAR),
        meta("MASK", type_code::VARCHAR),
    ];
    let rows = vec![vec![
        Value::Int(1),
        Value::Str("secret".into()),
        Value::Str("real".into()),
    ]];
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, rows)), 100).unwrap();
    let context = WriteContext {
        excluded: std::collections::HashSet::from([1]),
        remap: std::collections::HashMap::from([(2, "masked".to_owned())]),
        ..WriteContext::default()
    };
    let sink = FileSink::create(&path, 64 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(context)));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    writer
        .write_all(
            source,
            &encoder,
            &CancelToken::new(),
            &WriteOptions {
                include_header: true,
                ..WriteOptions::default()
            },
        )
        .unwrap();
    writer.finish().unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "KEEP,masked\n1,masked\n"
    );
}
