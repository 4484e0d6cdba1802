pub mod cli;
pub mod data;
pub mod error;
pub mod identifier;
pub mod inference;
pub mod ingest;
pub mod io_utils;
pub mod loader;
pub mod overrides;
pub mod preview;
pub mod reader;
pub mod schema;
pub mod sqlite;
pub mod storage;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, InputArgs, ReportFormat},
    inference::TypeOverride,
    ingest::IngestOptions,
    overrides::TypeOverrides,
    reader::{DelimitedOptions, DelimitedSource, SheetSource},
    sqlite::SqliteStorage,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Overrides(args) => handle_overrides(&args),
        Commands::Tables(args) => preview::list(&args),
        Commands::Preview(args) => preview::execute(&args),
    }
}

fn handle_ingest(args: &cli::IngestArgs) -> Result<()> {
    let overrides = match &args.overrides {
        Some(path) => TypeOverrides::load(path)?,
        None => TypeOverrides::new(),
    };
    info!(
        "Ingesting {} source(s) into {:?} ({} pinned type override(s), on row error: {})",
        args.inputs.len(),
        args.db,
        overrides.fixed_count(),
        args.on_row_error
    );
    let options = IngestOptions {
        overrides,
        row_error_policy: args.on_row_error,
    };
    let sources = delimited_sources(&args.inputs, &args.input)?;

    let mut storage = SqliteStorage::open(&args.db)
        .with_context(|| format!("Opening database {:?}", args.db))?;
    let report = match ingest::ingest(&mut storage, sources, &options) {
        Ok(report) => report,
        Err(err) => {
            print_report(err.partial_report(), args.report)?;
            return Err(err.into());
        }
    };
    print_report(&report, args.report)?;

    if report.has_problems() {
        bail!("Ingestion finished with problems; see the report above");
    }
    Ok(())
}

fn print_report(report: &ingest::IngestReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Table => print!("{}", table::render_report(report)),
        ReportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).context("Serializing ingest report")?
        ),
    }
    Ok(())
}

fn handle_overrides(args: &cli::OverridesArgs) -> Result<()> {
    let policy = sqlite::sqlite_identifier_policy();
    let mut template = TypeOverrides::new();
    for mut source in delimited_sources(&args.inputs, &args.input)? {
        let sheets = source
            .read_sheets()
            .with_context(|| format!("Reading source '{}'", source.name()))?;
        for sheet in sheets {
            let table = policy.sanitize(&sheet.name);
            if table.is_empty() {
                continue;
            }
            for column in &sheet.columns {
                let column = policy.sanitize(&column.name);
                if !column.is_empty() {
                    template.insert(&table, &column, TypeOverride::Auto);
                }
            }
        }
    }
    debug!("Override template keys: {:?}", template.keys().collect::<Vec<_>>());

    match &args.output {
        Some(path) => {
            template.save(path)?;
            info!("Wrote {} override entr(ies) to {:?}", template.len(), path);
        }
        None => print!("{}", template.to_yaml_string()?),
    }
    Ok(())
}

fn delimited_sources(
    inputs: &[std::path::PathBuf],
    args: &InputArgs,
) -> Result<Vec<DelimitedSource>> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    if let Some(delimiter) = args.delimiter {
        debug!("Using delimiter '{}'", printable_delimiter(delimiter));
    }
    let options = DelimitedOptions {
        delimiter: args.delimiter,
        encoding,
        sample_rows: args.sample_rows,
    };
    Ok(inputs
        .iter()
        .map(|path| DelimitedSource::new(path, options.clone()))
        .collect())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
