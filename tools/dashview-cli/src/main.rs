//! Dashview CLI: inspect and export multi-camera dashcam events.
//!
//! Usage:
//!   dashview probe <DIR>      List clip groups and probed durations
//!   dashview export <DIR>     Export an event to a composited video
//!   dashview check            Check that ffmpeg and ffprobe are available

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dashview_common::config::AppConfig;

mod commands;
mod event_dir;
mod folder_source;

#[derive(Parser)]
#[command(
    name = "dashview",
    about = "Multi-camera dashcam viewer and exporter",
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
    /// List an event's clip groups and their probed durations
    Probe {
        /// Path to the event folder
        path: PathBuf,

        /// Print the event as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export an event to video
    Export {
        /// Path to the event folder
        path: PathBuf,

        /// Output file or directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4|webm|gif
        #[arg(long, default_value = "mp4")]
        format: String,

        /// Encoder quality: low|medium|high
        #[arg(long, default_value = "high")]
        quality: String,

        /// Start of the range in event seconds
        #[arg(long)]
        start: Option<f64>,

        /// End of the range in event seconds
        #[arg(long)]
        end: Option<f64>,

        /// Output FPS (defaults to the configured value)
        #[arg(long)]
        fps: Option<u32>,

        /// Playback speed multiplier (defaults to the configured value)
        #[arg(long)]
        speed: Option<f64>,

        /// Layout preset: grid|single
        #[arg(long, default_value = "grid")]
        layout: String,

        /// Camera exported by the single preset
        #[arg(long, default_value = "front")]
        camera: String,

        /// Grid output width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Grid output height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Encoder strategy: auto|live|buffered
        #[arg(long, default_value = "auto")]
        strategy: String,

        /// Leave out the info bar, HUD, and map
        #[arg(long)]
        no_overlay: bool,

        /// Suppress every location-revealing overlay
        #[arg(long)]
        privacy: bool,
    },

    /// Check external tool availability
    Check {
        /// Write a default config file if none exists
        #[arg(long)]
        init_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    dashview_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Probe { path, json } => commands::probe::run(path, json, &config).await,
        Commands::Export {
            path,
            output,
            format,
            quality,
            start,
            end,
            fps,
            speed,
            layout,
            camera,
            width,
            height,
            strategy,
            no_overlay,
            privacy,
        } => {
            let args = commands::export::ExportArgs {
                path,
                output,
                format,
                quality,
                start,
                end,
                fps,
                speed,
                layout,
                camera,
                width,
                height,
                strategy,
                include_overlay: !no_overlay,
                privacy,
            };
            commands::export::run(args, config).await
        }
        Commands::Check { init_config } => commands::check::run(&config, init_config),
    }
}
