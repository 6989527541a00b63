use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use pdf_table_extract::export::{
    CsvOptions, ExcelOptions, HtmlOptions, HtmlStyle, JsonOptions, JsonOrientation, SheetNaming,
};
use pdf_table_extract::toolchain::{self, PDFTOPPM};
use pdf_table_extract::{
    DetectionMode, Document, ExportFormat, ExportOptions, ExportScope, ExportSource,
    ExtractionOutcome, ExtractionSettings, Extractor, HeaderMode, QualityMode,
    TextLayoutDetector, export_tables,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf2tables",
    version,
    about = "Extract tables from text PDFs into CSV, Excel, JSON or HTML"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract tables and write them in the requested format.
    Extract(ExtractArgs),
    /// Check the native tools used for page previews.
    Doctor(DoctorArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output path; the extension picks the format unless --format is given.
    #[arg(short, long)]
    output: PathBuf,

    /// Page selection like 1-3,5 or `all`.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Detection mode: lattice or stream.
    #[arg(long, default_value = "lattice", value_parser = DetectionMode::from_str)]
    mode: DetectionMode,

    /// Low-confidence handling: best_effort, strict or skip_ambiguous.
    #[arg(long, default_value = "best_effort", value_parser = QualityMode::from_str)]
    quality: QualityMode,

    /// Header handling: auto, first_row or none.
    #[arg(long, default_value = "auto", value_parser = HeaderMode::from_str)]
    header: HeaderMode,

    /// Drop tables with fewer data rows than this.
    #[arg(long, default_value_t = 1)]
    min_rows: usize,

    /// Minimum cells required per candidate table row.
    #[arg(long, default_value_t = 2)]
    min_cols: usize,

    /// Output format: csv, excel, json or html.
    #[arg(long, value_parser = ExportFormat::from_str)]
    format: Option<ExportFormat>,

    /// Only export the table at this 1-based position.
    #[arg(long)]
    table: Option<usize>,

    /// CSV delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// CSV text encoding (utf-8, utf-8-sig, windows-1252, shift_jis, ...).
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// Omit the CSV header row.
    #[arg(long)]
    no_header_row: bool,

    /// Excel sheet naming: page or sequential.
    #[arg(long, default_value = "page", value_parser = SheetNaming::from_str)]
    sheet_naming: SheetNaming,

    /// Add a metadata sheet to Excel output.
    #[arg(long)]
    metadata: bool,

    /// JSON orientation: records, columns, index, split or values.
    #[arg(long, default_value = "records", value_parser = JsonOrientation::from_str)]
    orient: JsonOrientation,

    /// JSON indentation; 0 writes compact output.
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// HTML table style: plain, striped or bordered.
    #[arg(long, default_value = "plain", value_parser = HtmlStyle::from_str)]
    html_style: HtmlStyle,

    /// Add a row index column to HTML output.
    #[arg(long)]
    index: bool,

    /// Wrap HTML output in a full document.
    #[arg(long)]
    full_html: bool,

    /// Largest accepted input in MiB.
    #[arg(long, default_value_t = 200)]
    max_upload_mb: usize,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct DoctorArgs {
    /// Run the platform install command for missing tools.
    #[arg(long)]
    install: bool,
}

fn export_options(args: &ExtractArgs) -> Result<ExportOptions> {
    let output = args.output.to_string_lossy();
    let format = match args.format {
        Some(format) => format,
        None => ExportFormat::from_extension(&output).ok_or_else(|| {
            anyhow!("cannot infer the output format from '{output}'; pass --format")
        })?,
    };

    Ok(ExportOptions {
        format,
        scope: if args.table.is_some() {
            ExportScope::Selected
        } else {
            ExportScope::All
        },
        csv: CsvOptions {
            delimiter: args.delimiter,
            encoding: args.encoding.clone(),
            include_header: !args.no_header_row,
        },
        excel: ExcelOptions {
            naming: args.sheet_naming,
            include_metadata: args.metadata,
        },
        json: JsonOptions {
            orientation: args.orient,
            indent: args.indent,
        },
        html: HtmlOptions {
            style: args.html_style,
            include_index: args.index,
            full_document: args.full_html,
        },
    })
}

fn log_outcome(outcome: &ExtractionOutcome, verbose: bool) {
    if outcome.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", outcome.warnings.len());
    if verbose {
        for warning in &outcome.warnings {
            eprintln!(
                "  - {:?} page={:?} table_id={:?} confidence={:?}: {}",
                warning.code, warning.page, warning.table_id, warning.confidence, warning.message
            );
        }
    }
}

fn run_extract(args: &ExtractArgs) -> Result<ExtractionOutcome> {
    let options = export_options(args)?;
    let settings = ExtractionSettings {
        pages: args.pages.clone(),
        mode: args.mode,
        quality: args.quality,
        header_mode: args.header,
        min_rows: args.min_rows,
        min_cols: args.min_cols,
    };

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    let name = args
        .input
        .file_name()
        .map_or_else(|| "document.pdf".into(), |name| name.to_string_lossy());
    let document = Document::load(&name, bytes, args.max_upload_mb.saturating_mul(1024 * 1024))
        .with_context(|| format!("failed to open '{}'", args.input.display()))?;

    let detector = TextLayoutDetector;
    let outcome = Extractor::new(&detector)
        .run(&document, &settings, &mut |progress| {
            info!(
                page = progress.page,
                completed = progress.completed,
                total = progress.total,
                "page processed"
            );
        })
        .with_context(|| format!("failed to extract tables from '{}'", args.input.display()))?;

    if outcome.tables.is_empty() {
        return Ok(outcome);
    }

    let selected = args.table.map_or(0, |table| table.saturating_sub(1));
    let source = ExportSource::from_document(&document, Some(&settings));
    let artifact = export_tables(&outcome.tables, selected, &source, &options)
        .context("failed to export tables")?;
    std::fs::write(&args.output, &artifact.bytes)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;

    Ok(outcome)
}

fn run_doctor(args: &DoctorArgs) -> Result<()> {
    match toolchain::probe(&PDFTOPPM) {
        Ok(version) => {
            println!("ok: {version}");
            Ok(())
        }
        Err(error) if args.install => {
            eprintln!("{error}");
            let version = toolchain::run_guided_install(&PDFTOPPM)
                .context("guided install did not complete")?;
            println!("ok: {version}");
            Ok(())
        }
        Err(error) => Err(error).context("page previews are unavailable"),
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_table_extract=warn,pdf2tables=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => match run_extract(&args) {
            Ok(outcome) => {
                log_outcome(&outcome, args.verbose);
                if outcome.tables.is_empty() {
                    ExitCode::from(2)
                } else {
                    println!(
                        "wrote {} table(s) to {}",
                        outcome.tables.len(),
                        args.output.display()
                    );
                    ExitCode::SUCCESS
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
        Commands::Doctor(args) => match run_doctor(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
    }
}
