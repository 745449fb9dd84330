//! Output file naming.

use chrono::NaiveDateTime;

use dashview_event_model::{CameraId, ExportFormat};

const FALLBACK_BASE: &str = "export";

/// `{event timestamp}_{cameras}[_{speed}x].{ext}`, e.g.
/// `2024-05-01_12-30-00_front-back_4x.mp4`. The speed part is left out
/// at 1x.
pub fn output_file_name(
    event_started_at: Option<NaiveDateTime>,
    cameras: &[CameraId],
    speed: f64,
    format: ExportFormat,
) -> String {
    let mut parts = Vec::new();
    parts.push(match event_started_at {
        Some(at) => at.format("%Y-%m-%d_%H-%M-%S").to_string(),
        None => FALLBACK_BASE.to_string(),
    });

    let cameras: Vec<String> = cameras.iter().map(|c| sanitize(c.as_str())).filter(|c| !c.is_empty()).collect();
    if !cameras.is_empty() {
        parts.push(cameras.join("-"));
    }

    if (speed - 1.0).abs() > 1e-9 {
        parts.push(format!("{}x", format_speed(speed)));
    }

    format!("{}.{}", parts.join("_"), format.extension())
}

fn format_speed(speed: f64) -> String {
    if (speed - speed.round()).abs() < 1e-9 {
        format!("{}", speed.round() as i64)
    } else {
        let text = format!("{speed:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn started() -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(12, 30, 0))
    }

    #[test]
    fn test_name_with_speed() {
        let cameras = [CameraId::new("front"), CameraId::new("back")];
        assert_eq!(
            output_file_name(started(), &cameras, 4.0, ExportFormat::Mp4H264),
            "2024-05-01_12-30-00_front-back_4x.mp4"
        );
    }

    #[test]
    fn test_speed_omitted_at_one_x() {
        let cameras = [CameraId::new("front")];
        assert_eq!(
            output_file_name(started(), &cameras, 1.0, ExportFormat::Webm),
            "2024-05-01_12-30-00_front.webm"
        );
    }

    #[test]
    fn test_fractional_speed_and_fallback_base() {
        let cameras = [CameraId::new("left repeater")];
        assert_eq!(
            output_file_name(None, &cameras, 1.5, ExportFormat::Gif),
            "export_left_repeater_1.5x.gif"
        );
    }
}
