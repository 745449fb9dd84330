//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Export pipeline tuning.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Stall recovery thresholds.
    #[serde(default)]
    pub stall: StallLadderConfig,

    /// Limits for animated image exports.
    #[serde(default)]
    pub image_sequence: ImageSequenceLimits,

    /// Overlay text and fonts.
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters and pipeline timing bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Default output FPS.
    pub fps: u32,

    /// Default playback speed multiplier.
    pub speed: f64,

    /// Clip length assumed when probing a clip group fails.
    pub nominal_clip_secs: f64,

    /// How far before the requested start playback is positioned.
    pub preroll_secs: f64,

    /// Extra time past the requested end before the export completes.
    pub trailing_margin_secs: f64,

    /// Ticks to wait for all sources after a clip change.
    pub clip_ready_max_ticks: u32,

    /// Per-frame readiness timeout for buffered rendering.
    pub frame_ready_timeout_ms: u64,

    /// Poll interval while waiting for frame readiness.
    pub frame_poll_interval_ms: u64,

    /// Most RGBA frame memory the buffered strategy may hold, in bytes.
    pub max_buffered_bytes: u64,

    /// Maximum progress callbacks per second.
    pub progress_hz: u32,
}

/// Stall ladder thresholds.
///
/// Tick counts are consecutive ticks in which absolute time failed to
/// advance by more than `epsilon_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallLadderConfig {
    /// Stalled ticks between successive speed reductions.
    pub speed_step_ticks: u32,

    /// Stalled ticks (at floor speed) before a corrective seek.
    pub seek_ticks: u32,

    /// Stalled ticks (at floor speed) before giving up and proceeding.
    pub give_up_ticks: u32,

    /// Speed the first reduction lands on.
    pub intermediate_speed: f64,

    /// Lowest speed the ladder reduces to.
    pub floor_speed: f64,

    /// Pause applied around the first speed reduction.
    pub drop_pause_ms: u64,

    /// Minimum absolute-time advance that counts as progress.
    pub epsilon_secs: f64,
}

/// Limits applied to animated image exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSequenceLimits {
    pub max_width: u32,
    pub max_fps: u32,
    pub max_duration_secs: f64,
}

/// Overlay appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TrueType/OpenType font used for labels and the info bar.
    pub font_path: Option<PathBuf>,

    /// Branding text drawn at the right of the info bar.
    pub branding: Option<String>,

    /// Watermark text stamped on unlicensed exports.
    pub watermark_text: String,

    /// Label font size in pixels.
    pub label_font_px: f32,

    /// Info bar height in pixels.
    pub info_bar_height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "dashview=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            speed: 1.0,
            nominal_clip_secs: 60.0,
            preroll_secs: 1.0,
            trailing_margin_secs: 0.1,
            clip_ready_max_ticks: 90,
            frame_ready_timeout_ms: 2000,
            frame_poll_interval_ms: 10,
            max_buffered_bytes: 512 * 1024 * 1024,
            progress_hz: 10,
        }
    }
}

impl Default for StallLadderConfig {
    fn default() -> Self {
        Self {
            speed_step_ticks: 60,
            seek_ticks: 150,
            give_up_ticks: 300,
            intermediate_speed: 2.0,
            floor_speed: 1.0,
            drop_pause_ms: 500,
            epsilon_secs: 0.005,
        }
    }
}

impl Default for ImageSequenceLimits {
    fn default() -> Self {
        Self {
            max_width: 480,
            max_fps: 12,
            max_duration_secs: 15.0,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            branding: None,
            watermark_text: "DASHVIEW PREVIEW".to_string(),
            label_font_px: 18.0,
            info_bar_height: 36,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("dashview").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "stall": { "seek_ticks": 90 } }"#).unwrap();
        assert_eq!(config.stall.seek_ticks, 90);
        assert_eq!(config.stall.speed_step_ticks, 60);
        assert_eq!(config.export.fps, 30);
    }

    #[test]
    fn test_default_ladder_is_ordered() {
        let ladder = StallLadderConfig::default();
        assert!(ladder.speed_step_ticks < ladder.seek_ticks);
        assert!(ladder.seek_ticks < ladder.give_up_ticks);
        assert!(ladder.floor_speed < ladder.intermediate_speed);
    }
}
