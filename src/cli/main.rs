//! Background Removal CLI Tool
//!
//! Command-line interface for removing the background from a single image.

use super::config::CliConfigBuilder;
use crate::{
    inference::Segmenter,
    processor::BackgroundRemovalPipeline,
    tracing_config::{init_cli_tracing, TracingFormat},
    types::ProcessedResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove")]
pub struct Cli {
    /// Input image file (PNG or JPEG). Use "-" for stdin.
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file. Use "-" for stdout. [default: suggested file name next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Flatten the result onto this color (e.g. "#FFFFFF") and write JPEG instead of PNG
    #[arg(long, value_name = "HEX")]
    pub fill: Option<String>,

    /// Path to an ONNX segmentation model
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Square input size expected by the model
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub model_size: u32,

    /// Maximum accepted input size in bytes [default: 10 MiB]
    #[arg(long, value_name = "N")]
    pub max_bytes: Option<u64>,

    /// Longest side of the working image in pixels [default: 2000]
    #[arg(long, value_name = "N")]
    pub max_dimension: Option<u32>,

    /// JPEG quality (1-100) used with --fill [default: 90]
    #[arg(long, value_name = "N")]
    pub jpeg_quality: Option<u8>,

    /// JSON configuration file; explicit flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let fill = CliConfigBuilder::fill_color(&cli)?;
    let segmenter = create_segmenter(&cli)?;

    info!(
        input = %cli.input,
        backend = %segmenter.name(),
        fill = ?fill.map(|c| c.to_string()),
        "Starting background removal"
    );

    let pipeline = BackgroundRemovalPipeline::new(config, segmenter)
        .context("Failed to create pipeline")?;

    let result = if is_stdio(&cli.input) {
        pipeline
            .process_reader(tokio::io::stdin(), fill)
            .await
            .context("Failed to remove background from stdin")?
    } else {
        pipeline
            .process_file(&cli.input, fill)
            .await
            .with_context(|| format!("Failed to remove background from {}", cli.input))?
    };

    deliver(&cli, &result)?;
    info!("{}", result.timing_summary());
    Ok(())
}

/// Load the segmentation backend selected on the command line
#[cfg(feature = "tract")]
fn create_segmenter(cli: &Cli) -> Result<Arc<dyn Segmenter>> {
    use crate::backends::TractSegmenter;

    let model = cli
        .model
        .as_ref()
        .context("No model specified. Use --model to point at an ONNX segmentation model")?;
    let preprocessing = CliConfigBuilder::preprocessing_config(cli)?;
    let segmenter = TractSegmenter::from_path(model, preprocessing)
        .with_context(|| format!("Failed to load model {}", model.display()))?;
    Ok(Arc::new(segmenter))
}

#[cfg(not(feature = "tract"))]
fn create_segmenter(_cli: &Cli) -> Result<Arc<dyn Segmenter>> {
    anyhow::bail!("No segmentation backend compiled in. Please rebuild with --features tract")
}

/// Write the encoded result where the user asked for it
fn deliver(cli: &Cli, result: &ProcessedResult) -> Result<()> {
    match cli.output.as_deref() {
        Some(target) if is_stdio(target) => {
            write_stdout(result.bytes())?;
            info!("Image written to stdout");
        },
        Some(target) => {
            save(result, Path::new(target))?;
        },
        None if is_stdio(&cli.input) => {
            // No file to sit next to, so stdin input goes to stdout
            write_stdout(result.bytes())?;
            info!("Image written to stdout");
        },
        None => {
            let path = default_output_path(Path::new(&cli.input), result.file_name());
            save(result, &path)?;
        },
    }
    Ok(())
}

fn save(result: &ProcessedResult, path: &Path) -> Result<()> {
    result
        .save(path)
        .with_context(|| format!("Failed to save result to {}", path.display()))?;
    info!(
        path = %path.display(),
        mime_type = %result.mime_type(),
        bytes = result.bytes().len(),
        "Image saved"
    );
    Ok(())
}

fn is_stdio(arg: &str) -> bool {
    arg == "-"
}

/// Place the suggested file name in the input's directory
fn default_output_path(input_path: &Path, file_name: &str) -> PathBuf {
    let dir = input_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let path = dir.join(file_name);
    debug!(path = %path.display(), "Using default output path");
    path
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
