//! Check external tool availability.

use dashview_common::config::{config_file_path, AppConfig};
use dashview_export_engine::encoder::ffmpeg::command_exists;
use dashview_export_engine::text::TextPainter;

pub fn run(config: &AppConfig, init_config: bool) -> anyhow::Result<()> {
    println!("Dashview System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for (binary, purpose) in [("ffmpeg", "decoding and encoding"), ("ffprobe", "clip durations")] {
        if command_exists(binary) {
            println!("[OK] {binary} ({purpose})");
        } else {
            println!("[MISSING] {binary} ({purpose}): install FFmpeg and make sure it is on PATH");
            all_ok = false;
        }
    }

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else if init_config {
        config.save()?;
        println!("[OK] Config: wrote defaults to {}", path.display());
    } else {
        println!("[INFO] Config: {} (not present, using defaults)", path.display());
    }

    match &config.overlay.font_path {
        Some(font) => match TextPainter::load(font) {
            Ok(_) => println!("[OK] Overlay font: {}", font.display()),
            Err(e) => println!("[WARN] Overlay font unusable: {e}"),
        },
        None => println!("[INFO] Overlay font not configured; text draws as plates only"),
    }

    println!();
    if all_ok {
        println!("All required tools are available. Dashview is ready.");
    } else {
        println!("Some required tools are missing. See above for fixes.");
    }
    Ok(())
}
