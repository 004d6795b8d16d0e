use tabflow::codec::{CodecConfig, Encoder};
use tabflow::db::ColumnMeta;
use tabflow::db::memory::MemoryCursor;
use tabflow::schema::type_code;
use tabflow::value::Value;
use tabflow::{
    CancelToken, CsvLineFormatter, Error, FileSink, PrefetchOptions, RowSource, RowWriter,
    WriteContext, WriteOptions,
};

fn numbered_cursor(rows: usize) -> MemoryCursor {
    MemoryCursor::new(
        vec![ColumnMeta {
            name: "SEQ".into(),
            vendor_type: type_code::INTEGER,
            size: 0,
        }],
        (0..rows).map(|i| vec![Value::Int(i as i32)]).collect(),
    )
}

#[test]
fn prefetched_rows_reach_the_file_in_cursor_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.csv");
    let source = RowSource::open(Box::new(numbered_cursor(10_000)), 100).unwrap();
    let sink = FileSink::create(&path, 256 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(WriteContext::default())));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();
    let written = writer
        .write_all(
            source,
            &encoder,
            &CancelToken::new(),
            &WriteOptions {
                prefetch: Some(PrefetchOptions {
                    fetch_hint: 100,
                    fetch_limit: 0,
                }),
                ..WriteOptions::default()
            },
        )
        .unwrap();
    assert_eq!(written, 10_000);
    writer.finish().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let values: Vec<usize> = text.lines().map(|l| l.parse().unwrap()).collect();
    let expected: Vec<usize> = (0..10_000).collect();
    assert_eq!(values, expected);
}

#[test]
fn abort_mid_stream_bounds_output_and_surfaces_aborted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.csv");
    let options = PrefetchOptions {
        fetch_hint: 50,
        fetch_limit: 0,
    };
    let capacity = options.queue_capacity() as u64;
    let token = CancelToken::new();
    let trigger = token.clone();

    let source = RowSource::open(Box::new(numbered_cursor(100_000)), 50).unwrap();
    let sink = FileSink::create(&path, 256 * 1024, "csv").unwrap();
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(WriteContext::default())));
    let encoder = Encoder::new(&CodecConfig::default()).unwrap();

    let mut rows_seen = 0u64;
    let result = {
        let counter = &mut rows_seen;
        // Drive write_all manually so the abort fires after row 500.
        let source = source;
        let mut write = |cells: &[tabflow::EncodedCell]| {
            writer.write_row(cells)?;
            *counter += 1;
            if *counter == 500 {
                trigger.cancel();
            }
            Ok(())
        };
        tabflow::source::run_prefetch(source, &encoder, &token, &options, &mut write)
    };
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Aborted), "unexpected: {err}");
    assert!(rows_seen >= 500);
    assert!(
        rows_seen <= 500 + capacity + 1,
        "saw {rows_seen}, queue capacity {capacity}"
    );
    writer.finish().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len() as u64, rows_seen);
    // Order still holds for whatever was written.
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line.parse::<usize>().unwrap(), i);
    }
}
