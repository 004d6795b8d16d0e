use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use tabflow::codec::{CodecConfig, Encoder};
use tabflow::db::memory::{MemoryCursor, MemoryDb, vendor_code_for_type_name};
use tabflow::db::{ColumnMeta, Connection};
use tabflow::detect::{detect_charset, resolve_encoding};
use tabflow::loader::ddl::infer_columns;
use tabflow::loader::options::Show;
use tabflow::{
    CancelToken, CsvLineFormatter, FileSink, Loader, LoaderOptions, Logger, RowSource, RowWriter,
    SqlInsertFormatter, Value, WriteContext, WriteOptions,
};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(
    name = "tabflow",
    version,
    about = "Move tabular rows between CSV files, INSERT scripts, and tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the charset of a CSV file and infer its column types.
    Inspect(InspectArgs),
    /// Rewrite a CSV file with a different dialect or compression.
    Convert(ConvertArgs),
    /// Turn a CSV file into an INSERT script.
    Script(ScriptArgs),
    /// Validate a CSV load against an in-memory staging table.
    Load(LoadArgs),
}

#[derive(Parser)]
struct CsvDialect {
    /// Field separator.
    #[arg(long, default_value = ",")]
    delimiter: char,
    /// Quote character.
    #[arg(long, default_value = "\"")]
    quote: char,
    /// Escape character.
    #[arg(long, default_value = "\"")]
    escape: char,
    /// Input has a header row.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    header: bool,
    /// Input charset; `auto` detects from the file head.
    #[arg(long, default_value = "auto")]
    encoding: String,
}

#[derive(Parser)]
struct InspectArgs {
    input: PathBuf,
    /// Emit JSON instead of human readable output.
    #[arg(long)]
    json: bool,
    /// Rows sampled for type inference.
    #[arg(long, default_value_t = 200)]
    scan_rows: usize,
    #[command(flatten)]
    dialect: CsvDialect,
}

#[derive(Parser)]
struct ConvertArgs {
    input: PathBuf,
    /// Output path; `.gz` / `.zip` extensions select compression.
    #[arg(long, short = 'o')]
    out: PathBuf,
    /// Output field separator.
    #[arg(long, default_value = ",")]
    out_delimiter: char,
    /// Quote every output field.
    #[arg(long)]
    quote_all: bool,
    /// Use CRLF line endings in the output.
    #[arg(long)]
    crlf: bool,
    /// Stop after this many rows (0 = all).
    #[arg(long, default_value_t = 0)]
    limit: u64,
    #[command(flatten)]
    dialect: CsvDialect,
}

#[derive(Parser)]
struct ScriptArgs {
    input: PathBuf,
    /// Target table name.
    #[arg(long)]
    table: String,
    /// Output path; defaults to `<table>.sql`.
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,
    /// Rows sampled for type inference.
    #[arg(long, default_value_t = 200)]
    scan_rows: usize,
    #[command(flatten)]
    dialect: CsvDialect,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ShowArg {
    Off,
    Ddl,
    Dml,
    All,
}

#[derive(Parser)]
struct LoadArgs {
    input: PathBuf,
    /// Target table name.
    #[arg(long)]
    table: String,
    /// Staging table columns, e.g. "id INTEGER, amount DECIMAL(10,2)".
    /// Omit together with `-O CREATE=true` to infer them.
    #[arg(long)]
    columns: Option<String>,
    /// Loader options as NAME=VALUE pairs (see the option table).
    #[arg(short = 'O', long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,
    /// Shortcut for `-O SHOW=...`.
    #[arg(long, value_enum)]
    show: Option<ShowArg>,
}

fn main() -> Result<(), AnyError> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect(args) => inspect(&args),
        Command::Convert(args) => convert(&args),
        Command::Script(args) => script(&args),
        Command::Load(args) => load(&args),
    }
}

/// Reads the whole input as typed-as-text rows plus header names.
fn read_rows(
    input: &Path,
    dialect: &CsvDialect,
) -> Result<(Vec<String>, Vec<Vec<String>>), AnyError> {
    let encoding = match resolve_encoding(&dialect.encoding) {
        Some(e) => e,
        None => {
            let mut head = vec![0u8; 8 * 1024];
            let mut file = File::open(input)?;
            let n = file.read(&mut head)?;
            head.truncate(n);
            detect_charset(&head)
        }
    };
    let file = File::open(input)?;
    let decoded = tabflow::detect::DecodingReader::new(file, encoding);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(dialect.delimiter as u8)
        .quote(dialect.quote as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded);
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    let header = if dialect.header && !rows.is_empty() {
        rows.remove(0)
    } else {
        let width = rows.first().map_or(0, Vec::len);
        (1..=width).map(|i| format!("COL{i}")).collect()
    };
    Ok((header, rows))
}

fn inferred_metas(
    header: &[String],
    rows: &[Vec<String>],
    scan_rows: usize,
) -> Vec<(ColumnMeta, String)> {
    let mut options = LoaderOptions::default();
    options.scan_rows = scan_rows;
    options
        .set("COLUMN_SIZE", "actual")
        .expect("static option name");
    infer_columns(&options, header, rows)
        .into_iter()
        .map(|c| {
            let base = c
                .declaration
                .split(['(', ' '])
                .next()
                .unwrap_or("VARCHAR")
                .to_owned();
            (
                ColumnMeta {
                    name: c.name,
                    vendor_type: vendor_code_for_type_name(&base),
                    size: 0,
                },
                c.declaration,
            )
        })
        .collect()
}

fn inspect(args: &InspectArgs) -> Result<(), AnyError> {
    let mut head = vec![0u8; 8 * 1024];
    let mut file = File::open(&args.input)?;
    let n = file.read(&mut head)?;
    head.truncate(n);
    let charset = detect_charset(&head).name();

    let (header, rows) = read_rows(&args.input, &args.dialect)?;
    let metas = inferred_metas(&header, &rows, args.scan_rows);
    if args.json {
        let columns: Vec<_> = metas
            .iter()
            .map(|(m, decl)| json!({ "name": m.name, "type": decl }))
            .collect();
        let report = json!({
            "file": args.input.display().to_string(),
            "charset": charset,
            "rows": rows.len(),
            "columns": columns,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File:    {}", args.input.display());
        println!("Charset: {charset}");
        println!("Rows:    {}", rows.len());
        println!("Columns:");
        for (meta, decl) in &metas {
            println!("    {:<24} {decl}", meta.name);
        }
    }
    Ok(())
}

/// Builds an in-memory cursor replaying the file rows as text cells.
fn text_cursor(header: &[String], rows: Vec<Vec<String>>) -> MemoryCursor {
    let metas: Vec<ColumnMeta> = header
        .iter()
        .map(|name| ColumnMeta {
            name: name.clone(),
            vendor_type: tabflow::schema::type_code::VARCHAR,
            size: 0,
        })
        .collect();
    let values = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|f| if f.is_empty() { Value::Null } else { Value::Str(f) })
                .collect()
        })
        .collect();
    MemoryCursor::new(metas, values)
}

fn convert(args: &ConvertArgs) -> Result<(), AnyError> {
    let (header, rows) = read_rows(&args.input, &args.dialect)?;
    let cursor = text_cursor(&header, rows);
    let source = RowSource::open(Box::new(cursor), 1000)?;

    let context = WriteContext {
        separator: args.out_delimiter,
        apply_quotes_to_all: args.quote_all,
        line_terminator: if args.crlf { "\r\n" } else { "\n" }.to_owned(),
        ..WriteContext::default()
    };
    let sink = FileSink::create(&args.out, 1024 * 1024, "csv")?;
    let mut writer = RowWriter::new(sink, Box::new(CsvLineFormatter::new(context)));
    let encoder = Encoder::new(&CodecConfig::default())?;
    let written = writer.write_all(
        source,
        &encoder,
        &CancelToken::new(),
        &WriteOptions {
            include_header: args.dialect.header,
            row_limit: args.limit,
            ..WriteOptions::default()
        },
    )?;
    writer.finish()?;
    println!("Wrote {written} rows to {}", args.out.display());
    Ok(())
}

fn script(args: &ScriptArgs) -> Result<(), AnyError> {
    let (header, rows) = read_rows(&args.input, &args.dialect)?;
    let metas: Vec<ColumnMeta> = inferred_metas(&header, &rows, args.scan_rows)
        .into_iter()
        .map(|(m, _)| m)
        .collect();
    let values: Vec<Vec<Value>> = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|f| if f.is_empty() { Value::Null } else { Value::Str(f) })
                .collect()
        })
        .collect();
    let source = RowSource::open(Box::new(MemoryCursor::new(metas, values)), 1000)?;

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.sql", args.table)));
    let sink = FileSink::create(&out, 1024 * 1024, "sql")?;
    let formatter = SqlInsertFormatter::new(WriteContext::default(), &args.table, source.columns());
    let mut writer = RowWriter::new(sink, Box::new(formatter));
    let encoder = Encoder::new(&CodecConfig::default())?;
    let written = writer.write_all(
        source,
        &encoder,
        &CancelToken::new(),
        &WriteOptions::default(),
    )?;
    writer.finish()?;
    println!("Wrote {written} statements to {}", out.display());
    Ok(())
}

fn load(args: &LoadArgs) -> Result<(), AnyError> {
    let mut options = LoaderOptions::default();
    for pair in &args.options {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            format!("option '{pair}' is not NAME=VALUE")
        })?;
        options.set(name, value)?;
    }
    if let Some(show) = args.show {
        let value = match show {
            ShowArg::Off => "OFF",
            ShowArg::Ddl => "DDL",
            ShowArg::Dml => "DML",
            ShowArg::All => "ALL",
        };
        options.set("SHOW", value)?;
    }

    let db = MemoryDb::new();
    let mut conn = db.connection();
    if let Some(spec) = &args.columns {
        conn.execute(&format!("CREATE TABLE {} ({spec})", args.table))?;
    } else if !options.create && options.show == Show::Off {
        return Err(
            "no staging table: pass --columns or -O CREATE=true to infer one".into(),
        );
    }

    let logger = match &options.logger_path {
        Some(path) => Logger::to_sink(File::create(path)?),
        None => Logger::stdout(),
    };
    let loader = Loader::new(options, logger);
    let stats = loader.load(&mut conn, &args.table, &args.input)?;
    let loaded = db.rows(&args.table).len();
    println!(
        "Validated {}: {} rows processed, {} staged, {} rejected",
        args.input.display(),
        stats.total_rows,
        loaded,
        stats.total_errors
    );
    Ok(())
}
