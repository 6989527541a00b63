use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pdf_table_extract::{PdftoppmRasterizer, TextLayoutDetector};
use pdf_table_genius::commands::Workbench;
use pdf_table_genius::config::AppConfig;
use pdf_table_genius::routes::{App, serve};
use tiny_http::Server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf-table-genius",
    version,
    about = "Upload PDFs, extract their tables, review them and download the results"
)]
struct Cli {
    /// Address to listen on; overrides PDF_TABLE_GENIUS_BIND.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on; overrides PDF_TABLE_GENIUS_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Upload limit in megabytes; overrides PDF_TABLE_GENIUS_MAX_UPLOAD_MB.
    #[arg(long)]
    max_upload_mb: Option<usize>,

    /// Start even when native tools are missing; previews will fail.
    #[arg(long)]
    skip_dependency_check: bool,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env().context("failed to read configuration from environment")?;
    if let Some(bind) = &cli.bind {
        config.bind.clone_from(bind);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(megabytes) = cli.max_upload_mb {
        config.max_upload_bytes = megabytes.saturating_mul(1024 * 1024);
    }
    config.validate().context("invalid command-line configuration")?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let address = config.address();
    let workbench = Workbench::new(
        Box::new(TextLayoutDetector),
        Box::new(PdftoppmRasterizer::default()),
        config,
    );

    let health = workbench.health();
    for component in [&health.detector, &health.rasterizer] {
        match &component.message {
            None => info!(component = %component.name, "dependency check passed"),
            Some(message) => warn!(component = %component.name, %message, "dependency check failed"),
        }
    }
    if !health.ok && !cli.skip_dependency_check {
        return Err(anyhow!(
            "required native tools are missing; run `pdf2tables doctor --install` or pass --skip-dependency-check"
        ));
    }

    let server = Server::http(&address)
        .map_err(|error| anyhow!("failed to bind {address}: {error}"))?;
    info!(%address, "listening");

    let mut app = App::new(workbench);
    serve(&server, &mut app);
    Ok(())
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_table_genius=info,pdf_table_extract=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(1)
        }
    }
}
