//! CLI binary for scandoc.
//!
//! A thin shim over the library crate: sends one page image to the
//! recognition endpoint and prints (or writes) the assembled Markdown.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use scandoc::{assemble, HttpRecognitionAdapter, PipelineConfig, RecognitionAdapter, RecognizeOptions};

#[derive(Parser, Debug)]
#[command(
    name = "scandoc",
    version,
    about = "Recognize a scanned page and print the assembled Markdown",
    arg_required_else_help = true
)]
struct Cli {
    /// Path to the page image (PNG or JPEG).
    image: PathBuf,

    /// Recognition API endpoint.
    #[arg(long, default_value = "http://127.0.0.1:8001/ocr")]
    endpoint: String,

    /// Prompt type sent with the request.
    #[arg(long, default_value = "document")]
    prompt_type: String,

    /// Write the Markdown here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let image = std::fs::read(&cli.image)
        .with_context(|| format!("failed to read '{}'", cli.image.display()))?;

    let config = PipelineConfig::builder()
        .endpoint(cli.endpoint)
        .prompt_type(cli.prompt_type.clone())
        .build()?;

    let adapter = HttpRecognitionAdapter::new(&config);
    let result = adapter
        .process(
            &image,
            &RecognizeOptions {
                prompt_type: cli.prompt_type,
            },
            &CancellationToken::new(),
        )
        .await
        .context("recognition request failed")?;

    // One-shot mode has no store, so no extracted figures to place; any
    // detection tags fall back to their surrounding text handling.
    let markdown = assemble(&result, &HashMap::new()).context("could not assemble markdown")?;

    match cli.output {
        Some(path) => std::fs::write(&path, markdown)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{markdown}")?;
        }
    }
    Ok(())
}
