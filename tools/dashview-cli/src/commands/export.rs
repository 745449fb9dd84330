//! Export an event to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashview_common::config::AppConfig;
use dashview_event_model::{
    CameraId, CameraMapping, ExportFormat, ExportOptions, ExportQuality, LayoutConfig, StrategyPreference,
};
use dashview_export_engine::encoder::ffmpeg::FfmpegRecorderFactory;
use dashview_export_engine::{ExportEngine, ExportOutcome, ExportProgress, LayoutProvider, ProgressCallback};

use crate::event_dir::{display_name, ordered_cameras, scan_event};
use crate::folder_source::FolderSource;

/// Parsed `export` arguments.
pub struct ExportArgs {
    pub path: PathBuf,
    pub output: Option<PathBuf>,
    pub format: String,
    pub quality: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub fps: Option<u32>,
    pub speed: Option<f64>,
    pub layout: String,
    pub camera: String,
    pub width: u32,
    pub height: u32,
    pub strategy: String,
    pub include_overlay: bool,
    pub privacy: bool,
}

/// Grid of every camera with readable slot labels.
struct GridPreset {
    layout: LayoutConfig,
    mapping: CameraMapping,
}

impl GridPreset {
    fn new(cameras: &[CameraId], width: u32, height: u32) -> Self {
        let ids: Vec<&str> = cameras.iter().map(CameraId::as_str).collect();
        let layout = LayoutConfig::grid(width, height, &ids);
        let mapping = CameraMapping::identity(&layout);
        Self { layout, mapping }
    }
}

impl LayoutProvider for GridPreset {
    fn layout(&self) -> LayoutConfig {
        self.layout.clone()
    }

    fn camera_mapping(&self) -> CameraMapping {
        self.mapping.clone()
    }

    fn camera_label(&self, camera: &CameraId) -> String {
        display_name(camera)
    }
}

fn parse_strategy(value: &str) -> anyhow::Result<StrategyPreference> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(StrategyPreference::Auto),
        "live" => Ok(StrategyPreference::Live),
        "buffered" => Ok(StrategyPreference::Buffered),
        _ => Err(anyhow::anyhow!("Unknown strategy: {value}. Use: auto, live, buffered")),
    }
}

fn build_options(args: &ExportArgs, config: &AppConfig) -> anyhow::Result<ExportOptions> {
    let format = ExportFormat::parse(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown format: {}. Use: mp4, webm, gif", args.format))?;
    let quality = ExportQuality::parse(&args.quality)
        .ok_or_else(|| anyhow::anyhow!("Unknown quality: {}. Use: low, medium, high", args.quality))?;
    Ok(ExportOptions {
        format,
        quality,
        start_secs: args.start,
        end_secs: args.end,
        include_overlay: args.include_overlay,
        privacy_mode: args.privacy,
        fps: args.fps.unwrap_or(config.export.fps),
        speed: args.speed.unwrap_or(config.export.speed),
        strategy: parse_strategy(&args.strategy)?,
    })
}

pub async fn run(args: ExportArgs, config: AppConfig) -> anyhow::Result<()> {
    println!("Exporting event at: {}", args.path.display());

    let options = build_options(&args, &config)?;
    let event = scan_event(&args.path)?;
    let cameras = ordered_cameras(&event);

    let recorders = FfmpegRecorderFactory::default();
    if !recorders.is_available() {
        return Err(anyhow::anyhow!("ffmpeg not found on PATH; run `dashview check`"));
    }

    let single = match args.layout.as_str() {
        "grid" => None,
        "single" => Some(CameraId::new(args.camera.as_str())),
        other => return Err(anyhow::anyhow!("Unknown layout: {other}. Use: grid, single")),
    };

    println!("  Cameras: {}", cameras.len());
    println!("  Format: {:?} ({:?})", options.format, options.quality);
    println!("  FPS: {}  Speed: {}x", options.fps, options.speed);

    let preset = GridPreset::new(&cameras, args.width, args.height);
    let source = FolderSource::open(event, cameras, options.fps);
    let engine = ExportEngine::new(Box::new(source), Arc::new(preset), Arc::new(recorders), config);

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling export");
            cancel.store(true, Ordering::Release);
        }
    });

    let progress: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:5.1}% [{:?}] {:.1}/{:.1}s  ",
            p.percent, p.phase, p.elapsed_export_secs, p.total_export_secs
        );
        let _ = std::io::stdout().flush();
    });

    let outcome = match single {
        Some(camera) => engine.start_single(camera, options, Some(progress)).await,
        None => engine.start(options, Some(progress)).await,
    };

    match outcome {
        Ok(ExportOutcome::Completed(output)) => {
            let path = match args.output {
                Some(path) if path.is_dir() => path.join(&output.file_name),
                Some(path) => path,
                None => PathBuf::from(&output.file_name),
            };
            std::fs::write(&path, &output.bytes)?;
            println!();
            println!(
                "Export complete: {} ({} frames, {:.1}s, {} bytes)",
                path.display(),
                output.frame_count,
                output.duration_secs,
                output.bytes.len()
            );
            if output.degraded {
                println!("  Note: some frames were produced while sources were stalled.");
            }
            let status = engine.status();
            if status.speed_reduced {
                println!(
                    "  Note: playback slowed from {}x to {}x to keep up with storage.",
                    status.original_speed, status.current_speed
                );
            }
        }
        Ok(ExportOutcome::Cancelled) => {
            println!();
            println!("Export cancelled.");
        }
        Err(e) => {
            println!();
            return Err(anyhow::anyhow!("Export failed: {e}"));
        }
    }
    Ok(())
}
