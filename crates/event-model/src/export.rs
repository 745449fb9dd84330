//! Caller-supplied export options.

use serde::{Deserialize, Serialize};

/// Output container/codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    Webm,
    /// Animated image; exported through the reduced image-sequence path.
    Gif,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 => "video/mp4",
            ExportFormat::Webm => "video/webm",
            ExportFormat::Gif => "image/gif",
        }
    }

    pub fn is_image_sequence(self) -> bool {
        matches!(self, ExportFormat::Gif)
    }

    /// Parse the CLI spelling (`mp4`, `mp4-h264`, `webm`, `gif`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "mp4" | "mp4-h264" => Some(ExportFormat::Mp4H264),
            "webm" => Some(ExportFormat::Webm),
            "gif" => Some(ExportFormat::Gif),
            _ => None,
        }
    }
}

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl ExportQuality {
    fn bits_per_pixel(self) -> f64 {
        match self {
            ExportQuality::Low => 0.05,
            ExportQuality::Medium => 0.1,
            ExportQuality::High => 0.2,
        }
    }

    /// Target video bitrate for the given output size and frame rate.
    pub fn bitrate_kbps(self, width: u32, height: u32, fps: u32) -> u32 {
        let bits = width as f64 * height as f64 * fps as f64 * self.bits_per_pixel();
        ((bits / 1000.0).round() as u32).max(500)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(ExportQuality::Low),
            "medium" => Some(ExportQuality::Medium),
            "high" => Some(ExportQuality::High),
            _ => None,
        }
    }
}

/// Which encoder strategy the session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Buffered when the range fits the memory bound, live otherwise.
    #[default]
    Auto,
    /// Real-time playback recorded as it renders.
    Live,
    /// Render every frame to memory first, then encode.
    Buffered,
}

/// Invalid option combinations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("start ({start}) must be before end ({end})")]
    EmptyRange { start: f64, end: f64 },

    #[error("time values must be finite and non-negative")]
    BadTime,

    #[error("fps must be positive")]
    ZeroFps,

    #[error("speed must be a positive finite number, got {0}")]
    BadSpeed(f64),
}

/// Options for one export, immutable for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub format: ExportFormat,

    pub quality: ExportQuality,

    /// Start of the exported range in absolute event seconds.
    pub start_secs: Option<f64>,

    /// End of the exported range in absolute event seconds.
    pub end_secs: Option<f64>,

    /// Draw the info bar, telemetry HUD, and map inset.
    pub include_overlay: bool,

    /// Suppress every location-revealing overlay regardless of
    /// `include_overlay`.
    #[serde(default)]
    pub privacy_mode: bool,

    pub fps: u32,

    /// Playback speed multiplier; `4.0` produces a 4x timelapse.
    pub speed: f64,

    #[serde(default)]
    pub strategy: StrategyPreference,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            quality: ExportQuality::default(),
            start_secs: None,
            end_secs: None,
            include_overlay: true,
            privacy_mode: false,
            fps: 30,
            speed: 1.0,
            strategy: StrategyPreference::default(),
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.fps == 0 {
            return Err(OptionsError::ZeroFps);
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(OptionsError::BadSpeed(self.speed));
        }
        for value in [self.start_secs, self.end_secs].into_iter().flatten() {
            if !value.is_finite() || value < 0.0 {
                return Err(OptionsError::BadTime);
            }
        }
        if let (Some(start), Some(end)) = (self.start_secs, self.end_secs) {
            if start >= end {
                return Err(OptionsError::EmptyRange { start, end });
            }
        }
        Ok(())
    }

    /// Requested range clamped to `[0, total_secs]`.
    pub fn resolved_range(&self, total_secs: f64) -> (f64, f64) {
        let start = self.start_secs.unwrap_or(0.0).clamp(0.0, total_secs);
        let end = self.end_secs.unwrap_or(total_secs).clamp(start, total_secs);
        (start, end)
    }

    /// Whether overlays that reveal time or place are drawn.
    pub fn overlays_enabled(&self) -> bool {
        self.include_overlay && !self.privacy_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_rejects_inverted_range() {
        let options = ExportOptions {
            start_secs: Some(40.0),
            end_secs: Some(10.0),
            ..Default::default()
        };
        assert_eq!(
            options.validate(),
            Err(OptionsError::EmptyRange {
                start: 40.0,
                end: 10.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_speed() {
        let options = ExportOptions {
            speed: 0.0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(OptionsError::BadSpeed(_))));
    }

    #[test]
    fn test_resolved_range_clamps_to_event() {
        let options = ExportOptions {
            start_secs: Some(100.0),
            end_secs: Some(500.0),
            ..Default::default()
        };
        assert_eq!(options.resolved_range(125.0), (100.0, 125.0));
        assert_eq!(ExportOptions::default().resolved_range(125.0), (0.0, 125.0));
    }

    #[test]
    fn test_privacy_overrides_overlay() {
        let options = ExportOptions {
            privacy_mode: true,
            ..Default::default()
        };
        assert!(!options.overlays_enabled());
    }

    #[test]
    fn test_bitrate_scales_with_quality() {
        let low = ExportQuality::Low.bitrate_kbps(1920, 1080, 30);
        let high = ExportQuality::High.bitrate_kbps(1920, 1080, 30);
        assert!(high > low);
        assert_eq!(ExportQuality::Low.bitrate_kbps(16, 16, 1), 500);
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: ExportOptions = serde_json::from_str(
            r#"{
                "format": "mp4-h264",
                "quality": "medium",
                "start_secs": 10.0,
                "end_secs": null,
                "include_overlay": true,
                "fps": 30,
                "speed": 4.0
            }"#,
        )
        .unwrap();
        assert_eq!(options.format, ExportFormat::Mp4H264);
        assert_eq!(options.quality, ExportQuality::Medium);
        assert_eq!(options.strategy, StrategyPreference::Auto);
        assert!(!options.privacy_mode);
        assert_eq!(serde_json::to_value(ExportFormat::Gif).unwrap(), "gif");
    }

    proptest! {
        #[test]
        fn prop_resolved_range_stays_inside_event(
            start in proptest::option::of(0.0f64..400.0),
            end in proptest::option::of(0.0f64..400.0),
            total in 0.0f64..300.0,
        ) {
            let options = ExportOptions { start_secs: start, end_secs: end, ..Default::default() };
            let (from, to) = options.resolved_range(total);
            prop_assert!(0.0 <= from);
            prop_assert!(from <= to);
            prop_assert!(to <= total);
        }
    }
}
