//! Quantbridge CLI - Quantize PNG images on a background worker
//!
//! Usage:
//!   quantbridge quantize <file.png>... [--out-dir <dir>] [--max-colors <n>]
//!
//! Examples:
//!   quantbridge quantize logo.png --max-colors 16
//!   quantbridge quantize a.png b.png --quality 60-90 --dithering 0.5 --out-dir out/
//!   quantbridge quantize logo.png --worker ./target/release/quantbridge-worker

use clap::{Parser, Subcommand};
use futures::future::join_all;
use quantbridge::config::Settings;
use quantbridge::prelude::*;
use quantbridge::telemetry::init_tracing;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "quantbridge")]
#[command(about = "Quantbridge - Lossy PNG palette quantization on an isolated worker")]
#[command(version)]
struct Cli {
    /// Config file (defaults to QUANTBRIDGE_CONFIG, ./quantbridge.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quantize one or more PNG files
    Quantize {
        /// PNG files to quantize
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Maximum palette size (2-256)
        #[arg(short, long)]
        max_colors: Option<u32>,

        /// Speed/quality trade-off (1 slowest, 10 fastest)
        #[arg(short, long)]
        speed: Option<u8>,

        /// Quality range as MIN-TARGET, each 0-100
        #[arg(short, long, value_parser = parse_quality)]
        quality: Option<QualityRange>,

        /// Dithering level (0.0-1.0)
        #[arg(short, long)]
        dithering: Option<f32>,

        /// Bits of precision to drop (0-4)
        #[arg(short, long)]
        posterization: Option<u8>,

        /// Run the worker as this executable instead of an in-process thread
        #[arg(long)]
        worker: Option<PathBuf>,

        /// Engine module URL sent to the worker
        #[arg(long)]
        engine_url: Option<String>,

        /// Per-file operation timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.logging.filter);

    let mut config = match settings.client.to_client_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Quantize {
            inputs,
            out_dir,
            max_colors,
            speed,
            quality,
            dithering,
            posterization,
            worker,
            engine_url,
            timeout_ms,
        } => {
            if let Some(path) = worker {
                config = config.with_worker_url(path);
            }
            if let Some(url) = engine_url {
                config = config.with_engine_url(url);
            }
            if let Some(ms) = timeout_ms {
                config = config.with_operation_timeout(Duration::from_millis(ms));
            }

            let options = QuantizeOptions {
                speed,
                quality,
                max_colors,
                dithering,
                posterization,
            };
            if let Err(e) = options.validate() {
                eprintln!("Invalid options: {}", e);
                return ExitCode::FAILURE;
            }

            cmd_quantize(config, inputs, out_dir, options).await
        }
    }
}

async fn cmd_quantize(
    config: ClientConfig,
    inputs: Vec<PathBuf>,
    out_dir: Option<PathBuf>,
    options: QuantizeOptions,
) -> ExitCode {
    if let Some(dir) = &out_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error creating '{}': {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let client = QuantizeClient::new(config);

    // All files share the one worker; requests are correlated by id.
    let jobs = inputs
        .iter()
        .map(|input| quantize_file(&client, input, out_dir.as_deref(), options.clone()));
    let outcomes = join_all(jobs).await;

    client.dispose();

    let mut failed = 0;
    for (input, outcome) in inputs.iter().zip(outcomes) {
        match outcome {
            Ok((output, result)) => println!(
                "{} -> {} ({} colors, quality {:.1}%)",
                input.display(),
                output.display(),
                result.palette_size,
                result.quality * 100.0
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", input.display(), e);
            }
        }
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn quantize_file(
    client: &QuantizeClient,
    input: &Path,
    out_dir: Option<&Path>,
    options: QuantizeOptions,
) -> Result<(PathBuf, QuantizeResult), String> {
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| format!("Error reading file: {}", e))?;

    let result = client
        .quantize_encoded(bytes, options)
        .await
        .map_err(|e| e.to_string())?;

    let image = result
        .image
        .as_deref()
        .ok_or_else(|| "worker returned no image".to_string())?;

    let output = output_path(input, out_dir);
    tokio::fs::write(&output, image)
        .await
        .map_err(|e| format!("Error writing '{}': {}", output.display(), e))?;

    Ok((output, result))
}

/// `dir/name.png` becomes `<out_dir or dir>/name-quantized.png`.
fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}-quantized.png", stem))
}

fn parse_quality(s: &str) -> Result<QualityRange, String> {
    let (min, target) = s
        .split_once('-')
        .ok_or_else(|| format!("expected MIN-TARGET, got '{}'", s))?;
    let min: u8 = min
        .trim()
        .parse()
        .map_err(|_| format!("invalid minimum quality '{}'", min))?;
    let target: u8 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid target quality '{}'", target))?;
    Ok(QualityRange { min, target })
}
