// SPDX-License-Identifier: MIT
//
// snapfolio — command-line document capture and conversion.
//
// Entry point. Initialises logging, parses the command line, and drives the
// conversion engine. Ctrl-C during a conversion cancels the job at the next
// page boundary and leaves no partial output behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use snapfolio_capture::{BoundaryDetector, RasterPage};
use snapfolio_convert::{Converter, spawn_conversion};
use snapfolio_core::{ConversionOptions, DocumentFormat, EngineConfig};

#[derive(Debug, Parser)]
#[command(name = "snapfolio", version, about = "Document capture to searchable output")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a document between formats.
    Convert(ConvertArgs),
    /// Detect the document boundary in a photographed page and print it.
    Detect(DetectArgs),
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Input file, or a directory of page images.
    input: PathBuf,
    /// Output file. For multi-page image output, numbered siblings are
    /// written next to it.
    output: PathBuf,

    /// Source format; inferred from the input extension when omitted.
    #[arg(long)]
    from: Option<String>,
    /// Target format; inferred from the output extension when omitted.
    #[arg(long)]
    to: Option<String>,

    /// JPEG quality for embedded or re-encoded images (1-100).
    #[arg(long, default_value_t = 85)]
    quality: u8,
    /// Omit page images from PDF output; recognized text is rendered visibly.
    #[arg(long)]
    no_images: bool,
    /// Recognize text and embed a searchable layer.
    #[arg(long)]
    ocr: bool,
}

#[derive(Debug, Args)]
struct DetectArgs {
    /// Photographed page image.
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Convert(args) => run_convert(args),
        Command::Detect(args) => run_detect(args),
    }
}

#[tokio::main]
async fn run_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let source = resolve_format(args.from.as_deref(), &args.input)
        .context("cannot determine source format; pass --from")?;
    let target = resolve_format(args.to.as_deref(), &args.output)
        .context("cannot determine target format; pass --to")?;

    let options = ConversionOptions::new(source, target)
        .with_quality(args.quality)
        .with_ocr(args.ocr);
    let options = ConversionOptions {
        include_images: !args.no_images,
        ..options
    };

    let mut converter = Converter::new(EngineConfig::default());
    if args.ocr {
        converter = converter.with_recognizer(build_recognizer()?);
    }

    let handle = spawn_conversion(Arc::new(converter), args.input, args.output, options);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling conversion");
            cancel.cancel();
        }
    });

    match handle.wait().await {
        Some(result) if result.success => {
            println!("{}", result.output_path.unwrap_or_default());
            Ok(())
        }
        Some(result) => bail!(
            "conversion failed: {}",
            result.error_message.unwrap_or_else(|| "unknown error".into())
        ),
        None => bail!("conversion cancelled"),
    }
}

fn run_detect(args: DetectArgs) -> anyhow::Result<()> {
    let config = EngineConfig::default();
    let page = RasterPage::open(&args.input, config.points_per_pixel())
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    match BoundaryDetector::new(config).detect(&page) {
        Some(quad) => {
            let corners = quad.corners();
            let json = serde_json::json!({
                "detected": true,
                "confidence": quad.confidence,
                "corners": corners
                    .iter()
                    .map(|p| serde_json::json!([p.x, p.y]))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        None => {
            println!("{}", serde_json::json!({ "detected": false }));
        }
    }
    Ok(())
}

/// Explicit format name if given, otherwise the path extension. A directory
/// input with no explicit format is treated as an image set.
fn resolve_format(explicit: Option<&str>, path: &Path) -> anyhow::Result<DocumentFormat> {
    if let Some(name) = explicit {
        return parse_format(name);
    }
    if path.is_dir() {
        return Ok(DocumentFormat::ImageSet);
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentFormat::from_extension)
        .ok_or_else(|| anyhow::anyhow!("no recognized extension on {}", path.display()))
}

fn parse_format(name: &str) -> anyhow::Result<DocumentFormat> {
    match name.to_ascii_lowercase().as_str() {
        "pdf" => Ok(DocumentFormat::Pdf),
        "docx" => Ok(DocumentFormat::Docx),
        "pptx" => Ok(DocumentFormat::Pptx),
        "txt" | "text" => Ok(DocumentFormat::PlainText),
        "images" | "imageset" | "jpg" | "jpeg" | "png" => Ok(DocumentFormat::ImageSet),
        other => bail!("unknown format {other:?} (expected pdf, docx, pptx, text, or images)"),
    }
}

#[cfg(feature = "ocr")]
fn build_recognizer() -> anyhow::Result<Arc<dyn snapfolio_convert::TextRecognizer>> {
    let recognizer = snapfolio_convert::OcrsRecognizer::with_defaults()
        .context("failed to initialise OCR engine")?;
    Ok(Arc::new(recognizer))
}

#[cfg(not(feature = "ocr"))]
fn build_recognizer() -> anyhow::Result<Arc<dyn snapfolio_convert::TextRecognizer>> {
    bail!("this build has no OCR support; rebuild with `--features ocr`")
}
