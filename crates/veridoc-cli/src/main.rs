use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use veridoc_capture::VideoFrame;
use veridoc_service::ServiceConfig;

#[derive(Parser)]
#[command(name = "veridoc", about = "Veridoc identity verification diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective policy after file and env layering
    Policy,
    /// Report capture diagnostics for an image file
    Inspect {
        /// Path to an encoded image (JPEG/PNG)
        #[arg(short, long)]
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Policy => {
            let config = ServiceConfig::from_env();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Inspect { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let decoded = image::load_from_memory(&bytes)
                .with_context(|| format!("failed to decode {}", image.display()))?;
            let rgb = decoded.to_rgb8();
            let frame = VideoFrame {
                width: rgb.width(),
                height: rgb.height(),
                rgb: rgb.into_raw(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "path": image.display().to_string(),
                    "bytes": bytes.len(),
                    "width": frame.width,
                    "height": frame.height,
                    "mean_brightness": frame.mean_brightness(),
                }))?
            );
        }
    }

    Ok(())
}
