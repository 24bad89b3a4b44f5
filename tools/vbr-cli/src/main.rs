//! vbr CLI: composite alpha-matted clips over a background with ffmpeg.
//!
//! Usage:
//!   vbr check                  Verify ffmpeg/ffprobe and decoder support
//!   vbr probe <SRC>            Print probed media metadata as JSON
//!   vbr compose <MANIFEST>     Dry-run, export or stream a composition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod manifest;

#[derive(Parser)]
#[command(
    name = "vbr",
    about = "Composite background-removed video over new backgrounds",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that ffmpeg and ffprobe are usable
    Check,

    /// Probe a file or URL
    Probe {
        /// Path or URL to inspect
        source: String,
    },

    /// Compile a composition manifest and export it
    Compose {
        /// Path to the JSON manifest
        manifest: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Encoder: h264, vp9, transparent-webm, prores-4444, png-sequence, stacked-video
        #[arg(long, default_value = "h264")]
        encoder: String,

        /// Print the ffmpeg command instead of running it
        #[arg(long)]
        dry_run: bool,

        /// Write this container to stdout instead of a file: y4m, webm, matroska, mp4-fragmented
        #[arg(long, conflicts_with = "dry_run")]
        stream: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = vbr_common::config::AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    vbr_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check => commands::check::run(config.media),
        Commands::Probe { source } => commands::probe::run(config.media, source),
        Commands::Compose {
            manifest,
            output,
            encoder,
            dry_run,
            stream,
        } => {
            commands::compose::run(
                config.media,
                commands::compose::ComposeArgs {
                    manifest,
                    output,
                    encoder,
                    dry_run,
                    stream,
                    verbose: cli.verbose,
                },
            )
            .await
        }
    }
}
