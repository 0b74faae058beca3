use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use timing_sheet_extract::{
    ExtractOptions, PageSelection, SheetKind, Table, parse_pdf, write_csv, write_csv_to_string,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sheet2csv",
    version,
    about = "Extract result tables from race timing-sheet PDFs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse one sheet and write its table as CSV or JSON.
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Sheet kind: quali, race, sprint, grid, pit-stops or lap-chart.
    #[arg(short, long)]
    kind: String,

    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output path. Standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Write JSON records instead of CSV.
    #[arg(long)]
    json: bool,

    /// List every warning, not just the count.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_options(args: &ParseArgs) -> Result<ExtractOptions> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(|error| anyhow!("invalid page selection: {error}"))
        .context("failed to parse --pages")?;

    if !args.delimiter.is_ascii() {
        anyhow::bail!("delimiter must be a single ASCII character");
    }

    Ok(ExtractOptions {
        pages,
        delimiter: args.delimiter as u8,
        ..ExtractOptions::default()
    })
}

fn log_warnings(table: &Table, verbose: bool) {
    if table.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", table.warnings.len());
    if verbose {
        for warning in &table.warnings {
            eprintln!(
                "  - {:?} page={:?} row={:?}: {}",
                warning.code, warning.page, warning.row, warning.message
            );
        }
    }
}

fn write_output(args: &ParseArgs, table: &Table, options: &ExtractOptions) -> Result<()> {
    if args.json {
        let json = table.to_json().context("failed to serialize table")?;
        match &args.output {
            Some(path) => std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write '{}'", path.display()))?,
            None => println!("{json}"),
        }
        return Ok(());
    }

    match &args.output {
        Some(path) => write_csv(path, table, options.delimiter)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => print!("{}", write_csv_to_string(table, options.delimiter)?),
    }
    Ok(())
}

fn run_parse(args: &ParseArgs) -> Result<Table> {
    let kind = SheetKind::from_str(&args.kind).map_err(|error| anyhow!(error))?;
    let options = parse_options(args)?;
    let table = parse_pdf(&args.input, kind, &options)
        .with_context(|| format!("failed to parse {kind} sheet '{}'", args.input.display()))?;
    write_output(args, &table, &options)?;
    Ok(table)
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("timing_sheet_extract=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Parse(args) => match run_parse(&args) {
            Ok(table) => {
                log_warnings(&table, args.verbose);
                if table.is_empty() {
                    ExitCode::from(2)
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
    }
}
